use super::{
    ActuatorError, CommandDispatcher, CommandKind, DispatchError, FlightPhase, FlipDirection, MoveDirection, PidAxis, PidTracker, RcCommand,
    Rotation, SafetyLimits, SafetyMonitor, SafetyVerdict, SafetyViolation, SequenceError, TransportError,
    VehicleActuator, VehicleCommand, VehicleTransport,
};
use crate::config::{DispatcherConfig, FollowConfig};
use crate::imaging::BlobDetector;
use crate::keychain::Keychain;
use crate::sim::{SimFault, SimSettings, SimulatedVehicle};
use crate::tracking::{Detection, DirectionFlags, FrameGeometry};
use std::{sync::Arc, time::Duration};
use strum::IntoEnumIterator;
use tokio::time::Instant;

fn quiet_sim() -> Arc<SimulatedVehicle> {
    Arc::new(SimulatedVehicle::new(SimSettings { jitter_px: 0.0, ..SimSettings::default() }))
}

fn transport(sim: &Arc<SimulatedVehicle>) -> Arc<dyn VehicleTransport> { Arc::clone(sim) as Arc<dyn VehicleTransport> }

async fn airborne_actuator(sim: &Arc<SimulatedVehicle>) -> VehicleActuator {
    let actuator = VehicleActuator::new(transport(sim), &FollowConfig::default());
    actuator.connect().await.unwrap();
    actuator.takeoff().await.unwrap();
    actuator
}

fn descent_commands(commands: &[VehicleCommand]) -> usize {
    commands.iter().filter(|c| matches!(c, VehicleCommand::Rc(rc) if rc.up_down == -80)).count()
}

#[test]
fn test_safety_check_order() {
    let monitor = SafetyMonitor::new(SafetyLimits::default());
    assert_eq!(monitor.check(false, Some(90), Some(50)), SafetyVerdict::Refused(SafetyViolation::NotConnected));
    assert_eq!(monitor.check(true, Some(9), Some(500)), SafetyVerdict::EmergencyLand(9));
    assert_eq!(
        monitor.check(true, Some(50), Some(301)),
        SafetyVerdict::Refused(SafetyViolation::HeightExceeded(301))
    );
    assert_eq!(monitor.check(true, Some(15), Some(100)), SafetyVerdict::Warn(15));
    assert_eq!(monitor.check(true, Some(20), Some(300)), SafetyVerdict::Allow);
    assert_eq!(monitor.check(true, None, None), SafetyVerdict::Allow);
    assert!(SafetyVerdict::Warn(15).permits_command());
    assert!(!SafetyVerdict::EmergencyLand(9).permits_command());
    assert_eq!(SafetyVerdict::EmergencyLand(9).violation(), Some(SafetyViolation::CriticalBattery(9)));
}

#[test]
fn test_pid_axis() {
    let mut pid = PidAxis::lateral();
    // 0.4 * 0.5 + 0.2 * (0.5 - 0) / 0.1
    assert!((pid.calculate(0.5, PidAxis::DEFAULT_DT) - 1.2).abs() < 1e-5);
    // Same error again, derivative vanishes.
    assert!((pid.calculate(0.5, PidAxis::DEFAULT_DT) - 0.2).abs() < 1e-5);
    assert!((pid.integral() - 0.1).abs() < 1e-6);
    pid.reset();
    assert!(pid.integral().abs() < f32::EPSILON && pid.previous_error().abs() < f32::EPSILON);
    assert!(pid.calculate(1.0, 0.0).is_finite());

    let mut unbounded = PidAxis::new(0.0, 1.0, 0.0);
    let mut bounded = PidAxis::new(0.0, 1.0, 0.0).with_integral_limit(0.5);
    for _ in 0..100 {
        unbounded.calculate(1.0, 0.1);
        bounded.calculate(1.0, 0.1);
    }
    assert!((unbounded.integral() - 10.0).abs() < 1e-3);
    assert!((bounded.calculate(1.0, 0.1) - 0.5).abs() < 1e-6);
}

#[test]
fn test_pid_tracker_moves_and_cooldown() {
    let mut tracker = PidTracker::new();
    let t0 = Instant::now();
    let moves = tracker.plan(0.9, 0.5, None, t0).unwrap();
    assert_eq!(moves, vec![(MoveDirection::Right, 50)]);
    assert!(tracker.plan(0.9, 0.5, None, t0 + Duration::from_millis(100)).is_none());
    assert!(tracker.plan(0.5, 0.55, Some(0.3), t0 + Duration::from_millis(600)).is_none());

    tracker.reset();
    let moves = tracker.plan(0.5, 0.1, Some(0.6), t0).unwrap();
    assert_eq!(moves[0], (MoveDirection::Up, 50));
    // 0.3 * 0.3 + 0.15 * 3.0 = 0.54 -> 43cm back
    assert_eq!(moves[1], (MoveDirection::Back, 43));
}

#[tokio::test(start_paused = true)]
async fn test_dispatcher_fifo_and_errors() {
    let sim = quiet_sim();
    sim.connect().await.unwrap();
    let dispatcher = CommandDispatcher::start(transport(&sim), DispatcherConfig::default());
    dispatcher.execute(VehicleCommand::Takeoff).await.unwrap();
    let rcs: Vec<_> = (1..=3).map(|i| RcCommand::clamped(0, i * 10, 0, 0)).collect();
    for rc in &rcs {
        dispatcher.dispatch(VehicleCommand::Rc(*rc)).unwrap();
    }
    sim.inject(SimFault::Command(CommandKind::Move));
    let failed = dispatcher.execute(VehicleCommand::Move(MoveDirection::Up, 30)).await;
    assert!(matches!(failed, Err(DispatchError::Transport(TransportError::Rejected(_)))));
    dispatcher.execute(VehicleCommand::Land).await.unwrap();

    let mut expected = vec![VehicleCommand::Takeoff];
    expected.extend(rcs.iter().map(|rc| VehicleCommand::Rc(*rc)));
    expected.push(VehicleCommand::Move(MoveDirection::Up, 30));
    expected.push(VehicleCommand::Land);
    assert_eq!(sim.commands(), expected);
    assert_eq!(dispatcher.executed(), 6);
    assert_eq!(dispatcher.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dispatcher_gap_between_commands() {
    let sim = quiet_sim();
    sim.connect().await.unwrap();
    let config = DispatcherConfig::default();
    let dispatcher = CommandDispatcher::start(transport(&sim), config);
    let start = Instant::now();
    dispatcher.execute(VehicleCommand::StreamOn).await.unwrap();
    dispatcher.execute(VehicleCommand::StreamOff).await.unwrap();
    assert!(start.elapsed() >= config.command_gap);
}

#[tokio::test(start_paused = true)]
async fn test_stopped_dispatcher_drains_nothing() {
    let sim = quiet_sim();
    sim.connect().await.unwrap();
    let dispatcher = CommandDispatcher::start(transport(&sim), DispatcherConfig::default());
    dispatcher.execute(VehicleCommand::Takeoff).await.unwrap();
    for _ in 0..5 {
        dispatcher.dispatch(VehicleCommand::Rc(RcCommand::HOVER)).unwrap();
    }
    dispatcher.stop();
    dispatcher.shutdown().await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(sim.commands(), vec![VehicleCommand::Takeoff]);
    assert!(dispatcher.is_stopped());
    assert_eq!(dispatcher.dispatch(VehicleCommand::Land), Err(DispatchError::Stopped));
    assert_eq!(dispatcher.execute(VehicleCommand::Land).await, Err(DispatchError::Stopped));
}

#[tokio::test(start_paused = true)]
async fn test_actuator_requires_flight_and_clamps() {
    let sim = quiet_sim();
    let actuator = VehicleActuator::new(transport(&sim), &FollowConfig::default());
    assert_eq!(actuator.battery(), Err(ActuatorError::NotConnected));
    assert_eq!(actuator.move_by(MoveDirection::Up, 50).await, Err(ActuatorError::NotFlying));
    actuator.connect().await.unwrap();
    assert_eq!(actuator.battery(), Ok(87));
    assert_eq!(actuator.hover().await, Err(ActuatorError::NotFlying));

    actuator.takeoff().await.unwrap();
    assert!(actuator.is_flying());
    assert_eq!(actuator.takeoff().await, Err(ActuatorError::AlreadyFlying));
    actuator.move_by(MoveDirection::Left, 5).await.unwrap();
    actuator.move_by(MoveDirection::Right, 900).await.unwrap();
    actuator.rotate(Rotation::Clockwise, 0).await.unwrap();
    actuator.rotate(Rotation::CounterClockwise, 720).await.unwrap();
    actuator.send_rc(150, -150, 0, 30).await.unwrap();

    let commands = sim.commands();
    assert_eq!(
        commands,
        vec![
            VehicleCommand::Takeoff,
            VehicleCommand::Move(MoveDirection::Up, 80),
            VehicleCommand::Move(MoveDirection::Left, 20),
            VehicleCommand::Move(MoveDirection::Right, 500),
            VehicleCommand::Rotate(Rotation::Clockwise, 1),
            VehicleCommand::Rotate(Rotation::CounterClockwise, 360),
            VehicleCommand::Rc(RcCommand { left_right: 100, forward_back: -100, up_down: 0, yaw: 30 }),
        ]
    );
    assert_eq!(actuator.commands_executed(), commands.len());
}

#[tokio::test(start_paused = true)]
async fn test_critical_battery_lands_before_command() {
    let sim = quiet_sim();
    let actuator = airborne_actuator(&sim).await;
    sim.set_battery(9);
    let result = actuator.move_by(MoveDirection::Forward, 100).await;
    assert_eq!(result, Err(ActuatorError::Safety(SafetyViolation::CriticalBattery(9))));
    let commands = sim.commands();
    assert_eq!(commands.last(), Some(&VehicleCommand::Land));
    assert!(!commands.contains(&VehicleCommand::Move(MoveDirection::Forward, 100)));
    assert!(!actuator.is_flying());
    assert!(!sim.is_flying());
}

#[tokio::test(start_paused = true)]
async fn test_height_limit_blocks_without_landing() {
    let sim = quiet_sim();
    let actuator = airborne_actuator(&sim).await;
    sim.set_height(350);
    let result = actuator.send_rc(0, 0, 50, 0).await;
    assert_eq!(result, Err(ActuatorError::Safety(SafetyViolation::HeightExceeded(350))));
    assert!(actuator.is_flying());
    assert!(!sim.commands().contains(&VehicleCommand::Land));

    // Low battery only warns.
    sim.set_height(120);
    sim.set_battery(15);
    assert!(actuator.move_by(MoveDirection::Down, 20).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_emergency_land_sequence() {
    let sim = quiet_sim();
    let actuator = VehicleActuator::new(transport(&sim), &FollowConfig::default());
    assert_eq!(actuator.emergency_land().await, Err(ActuatorError::NotFlying));
    actuator.connect().await.unwrap();
    actuator.takeoff().await.unwrap();

    let start = Instant::now();
    actuator.emergency_land().await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(1500));
    let commands = sim.commands();
    let hover_at = commands.iter().position(|c| *c == VehicleCommand::Rc(RcCommand::HOVER)).unwrap();
    assert_eq!(descent_commands(&commands[hover_at..]), 15);
    assert_eq!(commands.last(), Some(&VehicleCommand::Land));
    assert!(!actuator.is_flying());
    assert_eq!(sim.emergency_stops(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_emergency_land_falls_back_to_motor_cut() {
    let sim = quiet_sim();
    let actuator = airborne_actuator(&sim).await;
    sim.inject(SimFault::Command(CommandKind::Land));
    assert!(actuator.emergency_land().await.is_err());
    assert_eq!(sim.emergency_stops(), 1);
    assert!(!actuator.is_flying());
    assert!(!sim.is_flying());

    // The motor cut is attempted even without a connection.
    let offline = VehicleActuator::new(transport(&sim), &FollowConfig::default());
    offline.emergency_stop().await;
    assert_eq!(sim.emergency_stops(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_latest_rc_supersedes_queued_one() {
    let sim = quiet_sim();
    sim.connect().await.unwrap();
    let dispatcher = CommandDispatcher::start(transport(&sim), DispatcherConfig::default());
    dispatcher.execute(VehicleCommand::Takeoff).await.unwrap();

    // The worker sits in its command gap, everything below queues up behind the move.
    dispatcher.dispatch(VehicleCommand::Move(MoveDirection::Up, 20)).unwrap();
    let stale: Vec<_> = (1..=3).map(|i| RcCommand::clamped(0, i * 10, 0, 0)).collect();
    let freshest = RcCommand::clamped(0, 40, 0, -15);
    assert_eq!(dispatcher.dispatch_latest_rc(stale[0]), Ok(false));
    for rc in &stale[1..] {
        assert_eq!(dispatcher.dispatch_latest_rc(*rc), Ok(true));
    }
    assert_eq!(dispatcher.dispatch_latest_rc(freshest), Ok(true));
    assert_eq!(dispatcher.pending(), 2);
    dispatcher.execute(VehicleCommand::Land).await.unwrap();

    assert_eq!(
        sim.commands(),
        vec![
            VehicleCommand::Takeoff,
            VehicleCommand::Move(MoveDirection::Up, 20),
            VehicleCommand::Rc(freshest),
            VehicleCommand::Land,
        ]
    );
    assert_eq!(dispatcher.pending(), 0);

    // Once the queued one ran, the next stick command gets a fresh slot.
    assert_eq!(dispatcher.dispatch_latest_rc(RcCommand::HOVER), Ok(false));
    dispatcher.shutdown().await;
    assert_eq!(dispatcher.dispatch_latest_rc(RcCommand::HOVER), Err(DispatchError::Stopped));
}

#[tokio::test(start_paused = true)]
async fn test_flip_is_gated_like_movement() {
    assert_eq!(FlipDirection::try_from('x'), Err('x'));
    let sim = quiet_sim();
    let actuator = VehicleActuator::new(transport(&sim), &FollowConfig::default());
    actuator.connect().await.unwrap();
    let forward = FlipDirection::try_from('F').unwrap();
    assert_eq!(forward, FlipDirection::Forward);
    assert_eq!(actuator.flip(forward).await, Err(ActuatorError::NotFlying));
    assert!(sim.commands().is_empty());

    actuator.takeoff().await.unwrap();
    let left = FlipDirection::try_from('l').unwrap();
    assert_eq!(actuator.flip(left).await, Ok(()));
    assert_eq!(sim.commands().last(), Some(&VehicleCommand::Flip(FlipDirection::Left)));
    assert_eq!(sim.commands().iter().filter(|c| matches!(c, VehicleCommand::Flip(_))).count(), 1);

    sim.set_battery(8);
    let back = FlipDirection::try_from('b').unwrap();
    assert_eq!(actuator.flip(back).await, Err(ActuatorError::Safety(SafetyViolation::CriticalBattery(8))));
    assert_eq!(sim.commands().last(), Some(&VehicleCommand::Land));
}

#[tokio::test(start_paused = true)]
async fn test_track_target_moves() {
    let sim = quiet_sim();
    let actuator = airborne_actuator(&sim).await;
    assert_eq!(actuator.track_target(0.9, 0.5, None).await, Ok(true));
    assert!(sim.commands().contains(&VehicleCommand::Move(MoveDirection::Right, 50)));
    assert_eq!(actuator.track_target(0.9, 0.5, None).await, Ok(false));
    actuator.reset_tracking();
    assert_eq!(actuator.track_target(0.5, 0.5, None).await, Ok(false));
}

#[tokio::test(start_paused = true)]
async fn test_stream_wait_and_status() {
    let sim = quiet_sim();
    let actuator = VehicleActuator::new(transport(&sim), &FollowConfig::default());
    actuator.connect().await.unwrap();
    assert!(!actuator.wait_for_stream(Duration::from_secs(1)).await);
    assert!(actuator.get_frame().is_none());

    sim.inject(SimFault::NoFrames);
    actuator.stream_on().await.unwrap();
    let start = Instant::now();
    assert!(!actuator.wait_for_stream(Duration::from_secs(2)).await);
    assert!(start.elapsed() >= Duration::from_secs(2));

    sim.clear_fault(SimFault::NoFrames);
    assert!(actuator.wait_for_stream(Duration::from_secs(2)).await);
    assert_eq!(actuator.get_frame().map(|f| f.dimensions()), Some((320, 240)));

    let status = actuator.status();
    assert!(status.connected && status.streaming && !status.flying);
    assert_eq!(status.battery, Some(87));
    sim.inject(SimFault::Telemetry);
    assert_eq!(actuator.status().battery, None);

    actuator.disconnect().await;
    assert!(!actuator.is_connected() && !actuator.is_streaming());
    assert_eq!(sim.commands().last(), Some(&VehicleCommand::StreamOff));
}

#[test]
fn test_phase_transitions() {
    assert!(FlightPhase::Idle.can_transition_to(FlightPhase::Takeoff));
    assert!(!FlightPhase::Idle.can_transition_to(FlightPhase::Tracking));
    assert!(FlightPhase::Tracking.can_transition_to(FlightPhase::Idle));
    assert!(!FlightPhase::Tracking.can_transition_to(FlightPhase::Searching));
    assert!(!FlightPhase::Emergency.can_transition_to(FlightPhase::Tracking));
    for phase in FlightPhase::iter() {
        assert!(phase.can_transition_to(FlightPhase::Emergency));
        let name: &'static str = phase.into();
        assert_eq!(FlightPhase::try_from(name), Ok(phase));
    }
    assert_eq!(FlightPhase::try_from("TRACKING"), Ok(FlightPhase::Tracking));
    assert!(FlightPhase::try_from("hovering").unwrap_err().contains("hovering"));
}

fn keychain(sim: &Arc<SimulatedVehicle>, config: FollowConfig) -> Keychain {
    Keychain::new(transport(sim), config).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_takeoff_sequence_and_rejections() {
    let sim = quiet_sim();
    let keys = keychain(&sim, FollowConfig::default());
    let f_cont = keys.f_cont();
    assert_eq!(f_cont.land().await, Err(SequenceError::NotFlying));
    assert_eq!(
        f_cont.start_tracking(Box::new(BlobDetector::default())),
        Err(SequenceError::NotFlying)
    );

    let (first, second) = tokio::join!(f_cont.takeoff(), f_cont.takeoff());
    assert_eq!(first, Ok(()));
    assert_eq!(second, Err(SequenceError::AlreadyFlying));
    assert_eq!(f_cont.phase(), FlightPhase::Takeoff);
    assert_eq!(f_cont.takeoff().await, Err(SequenceError::AlreadyFlying));
    assert_eq!(sim.commands().iter().filter(|c| **c == VehicleCommand::Takeoff).count(), 1);

    f_cont.land().await.unwrap();
    assert_eq!(f_cont.phase(), FlightPhase::Idle);
    assert!(!sim.is_flying());
}

#[tokio::test(start_paused = true)]
async fn test_takeoff_failures_return_to_idle() {
    let sim = quiet_sim();
    sim.inject(SimFault::Connect);
    let f_cont = keychain(&sim, FollowConfig::default()).f_cont();
    assert!(matches!(f_cont.takeoff().await, Err(SequenceError::ConnectFailed(_))));
    assert_eq!(f_cont.phase(), FlightPhase::Idle);

    let sim = quiet_sim();
    sim.inject(SimFault::NoFrames);
    let f_cont = keychain(&sim, FollowConfig::default()).f_cont();
    assert_eq!(f_cont.takeoff().await, Err(SequenceError::StreamTimeout));
    assert_eq!(f_cont.phase(), FlightPhase::Idle);
    assert!(!sim.commands().contains(&VehicleCommand::Takeoff));

    let sim = quiet_sim();
    sim.inject(SimFault::Command(CommandKind::Takeoff));
    let f_cont = keychain(&sim, FollowConfig::default()).f_cont();
    assert!(matches!(f_cont.takeoff().await, Err(SequenceError::TakeoffFailed(_))));
    assert_eq!(f_cont.phase(), FlightPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_failure_after_liftoff_lands_in_emergency() {
    let sim = quiet_sim();
    sim.inject(SimFault::Command(CommandKind::Move));
    let f_cont = keychain(&sim, FollowConfig::default()).f_cont();
    assert!(matches!(f_cont.takeoff().await, Err(SequenceError::TakeoffFailed(_))));
    let commands = sim.commands();
    assert_eq!(descent_commands(&commands), 15);
    assert_eq!(commands.last(), Some(&VehicleCommand::Land));
    assert!(!sim.is_flying());
    assert_eq!(f_cont.phase(), FlightPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_tracking_is_idempotent_and_follows_target() {
    let sim = quiet_sim();
    let keys = keychain(&sim, FollowConfig::default());
    let f_cont = keys.f_cont();
    f_cont.takeoff().await.unwrap();
    let (start_dx, _, start_size) = sim.target();

    assert_eq!(f_cont.start_tracking(Box::new(BlobDetector::default())), Ok(true));
    assert_eq!(f_cont.start_tracking(Box::new(BlobDetector::default())), Ok(false));
    assert!(f_cont.is_tracking());
    tokio::time::sleep(Duration::from_secs(8)).await;

    let status = f_cont.status();
    assert_eq!(status.phase, FlightPhase::Tracking);
    assert!(status.tracking_active);
    assert!(status.tracking.target_detected);
    assert!(status.tracking.frames_processed > 50);
    assert!(keys.frames().latest().is_some());
    let (dx, _, size) = sim.target();
    assert!(dx.abs() < start_dx.abs(), "target not re-centred: {start_dx} -> {dx}");
    assert!(size > start_size, "vehicle did not close in: {start_size} -> {size}");

    assert_eq!(f_cont.stop_tracking().await, Ok(true));
    assert_eq!(f_cont.phase(), FlightPhase::Idle);
    assert!(!f_cont.is_tracking());
    assert!(!sim.is_flying());
    let status = f_cont.status();
    assert!(!status.tracking.target_detected);
    assert!(status.tracking.velocity.is_zero());
    assert_eq!(status.tracking.flags, DirectionFlags::default());
    assert_eq!(f_cont.stop_tracking().await, Ok(false));
}

#[tokio::test(start_paused = true)]
async fn test_new_session_starts_without_stale_track() {
    let sim = quiet_sim();
    sim.set_target_visible(false);
    let keys = keychain(&sim, FollowConfig::default());
    let f_cont = keys.f_cont();
    f_cont.takeoff().await.unwrap();
    keys.tracking().move_closer().unwrap();
    let thresholds = keys.tracking().thresholds();
    for _ in 0..10 {
        keys.tracking().observe(Some(Detection::new(120, 120, 40)), FrameGeometry::square(240));
    }
    assert!(keys.tracking().velocity().1.forward_back > 0);

    assert_eq!(f_cont.start_tracking(Box::new(BlobDetector::default())), Ok(true));
    let status = f_cont.status();
    assert!(!status.tracking.target_detected);
    assert!(status.tracking.velocity.is_zero());
    assert_eq!(status.tracking.frames_processed, 0);
    assert_eq!(status.tracking.thresholds, thresholds);

    tokio::time::sleep(Duration::from_secs(2)).await;
    let moved = sim.commands().into_iter().any(|c| matches!(c, VehicleCommand::Rc(rc) if !rc.is_hover()));
    assert!(!moved, "stale velocity reached the vehicle");
    f_cont.stop_tracking().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_tracking_tick_delivers_latest_velocity() {
    let sim = quiet_sim();
    let keys = keychain(&sim, FollowConfig::default());
    let f_cont = keys.f_cont();
    f_cont.run_flight_sequence(Box::new(BlobDetector::default())).await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    sim.set_target_visible(false);
    tokio::time::sleep(Duration::from_secs(1)).await;

    // After the loss every tick hovers, and nothing older overtakes it.
    let commands = sim.commands();
    let last_rc = commands.iter().rev().find_map(|c| match c {
        VehicleCommand::Rc(rc) => Some(*rc),
        _ => None,
    });
    assert_eq!(last_rc, Some(RcCommand::HOVER));
    let rcs = commands.iter().filter(|c| matches!(c, VehicleCommand::Rc(_))).count();
    assert!(rcs >= 25, "only {rcs} RC commands in 4s");
    f_cont.stop_tracking().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_search_finds_visible_target() {
    let sim = quiet_sim();
    let mut config = FollowConfig::default();
    config.flight.search_enabled = true;
    let f_cont = keychain(&sim, config).f_cont();
    f_cont.run_flight_sequence(Box::new(BlobDetector::default())).await.unwrap();
    let mut phase = f_cont.watch_phase();
    tokio::time::timeout(Duration::from_secs(10), phase.wait_for(|p| *p == FlightPhase::Tracking))
        .await
        .unwrap()
        .unwrap();
    f_cont.stop_tracking().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_search_exhaustion_lands() {
    let sim = quiet_sim();
    sim.set_target_visible(false);
    let mut config = FollowConfig::default();
    config.flight.search_enabled = true;
    let f_cont = keychain(&sim, config).f_cont();
    f_cont.run_flight_sequence(Box::new(BlobDetector::default())).await.unwrap();
    let mut phase = f_cont.watch_phase();
    tokio::time::timeout(Duration::from_secs(60), phase.wait_for(|p| *p == FlightPhase::Idle))
        .await
        .unwrap()
        .unwrap();
    let commands = sim.commands();
    let rotations = commands.iter().filter(|c| matches!(c, VehicleCommand::Rotate(Rotation::Clockwise, 30))).count();
    assert_eq!(rotations, 12);
    assert_eq!(commands.last(), Some(&VehicleCommand::Land));
    assert!(!sim.is_flying());
}

#[tokio::test(start_paused = true)]
async fn test_critical_battery_aborts_tracking() {
    let sim = quiet_sim();
    let f_cont = keychain(&sim, FollowConfig::default()).f_cont();
    f_cont.run_flight_sequence(Box::new(BlobDetector::default())).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    sim.set_battery(5);
    let mut phase = f_cont.watch_phase();
    tokio::time::timeout(Duration::from_secs(10), phase.wait_for(|p| *p == FlightPhase::Idle))
        .await
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!sim.is_flying());
    assert!(sim.commands().contains(&VehicleCommand::Land));
    assert!(!f_cont.is_tracking());
}
