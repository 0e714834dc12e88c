//! End-to-end device behaviour against the simulated control system.

use mx_core::{BeamlineConfig, Device, Movable, MxError, PvClient};
use mx_devices::{Beamline, RotationMode};
use mx_sim::{MockMode, SimConfig};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn instant() -> Beamline {
    Beamline::simulated(&BeamlineConfig::default(), &SimConfig::default())
        .unwrap()
        .0
}

#[tokio::test]
async fn test_config_file_prefixes_reach_addresses() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[dewar]
prefix = "XF:17IDC-ES:FMX"
rotation_timeout_ms = 5000

[robot]
prefix = "XF:17IDC-ES:FMX"
"#
    )
    .unwrap();

    let config = BeamlineConfig::load(Some(file.path())).unwrap();
    let (beamline, _) = Beamline::simulated(&config, &SimConfig::default()).unwrap();

    assert_eq!(beamline.dewar.rotation.pv(), "XF:17IDC-ES:FMX{Dew:1-Ax:R}Virtual");
    assert_eq!(beamline.robot_arm.speed.pv(), "XF:17IDC-ES:FMX{EMBL}:RobotSpeed");
    // Untouched sections keep their defaults
    assert_eq!(beamline.cryostream.readback.pv(), "XF:17IDB-ES:AMX{CS:1}TEMP");
    assert_eq!(beamline.gonio.o.prefix(), "XF:17IDB-ES:AMX{Gon:1-Ax:O}Mtr");

    assert_eq!(beamline.dewar.rotate(15.0, RotationMode::Absolute).await.unwrap(), 15.0);
}

#[tokio::test]
async fn test_dewar_rotation_sequence() {
    let beamline = instant();
    let dewar = &beamline.dewar;

    dewar.rotate(90.0, RotationMode::Absolute).await.unwrap();
    dewar.rotate(-45.0, RotationMode::Relative).await.unwrap();
    let position = dewar.rotate(45.0, RotationMode::Relative).await.unwrap();

    assert_eq!(position, 90.0);
    assert_eq!(dewar.rotation.get().await.unwrap(), 90.0);
    assert!(dewar.rotation_motor.is_done().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_realistic_rotation_waits_for_motion() {
    let config = SimConfig::with_mode(MockMode::Realistic);
    let (beamline, _) = Beamline::simulated(&BeamlineConfig::default(), &config).unwrap();

    let start = tokio::time::Instant::now();
    let position = beamline
        .dewar
        .rotate(60.0, RotationMode::Absolute)
        .await
        .unwrap();

    assert_eq!(position, 60.0);
    // 60 deg at 30 deg/s
    assert!(start.elapsed() >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_rotation_rejected() {
    let config = SimConfig::with_mode(MockMode::Realistic);
    let (beamline, sim) = Beamline::simulated(&BeamlineConfig::default(), &config).unwrap();

    let first = {
        let dewar = beamline.dewar.clone();
        tokio::spawn(async move { dewar.rotate(180.0, RotationMode::Absolute).await })
    };
    tokio::time::sleep(Duration::from_millis(500)).await;

    let err = beamline
        .dewar
        .rotate(10.0, RotationMode::Absolute)
        .await
        .unwrap_err();
    assert!(matches!(err, MxError::MotorAlreadyMoving(_)));
    // The rejected call wrote nothing
    assert_eq!(
        sim.value(beamline.dewar.rotation.pv()),
        Some(180.0.into())
    );

    assert_eq!(first.await.unwrap().unwrap(), 180.0);
}

#[tokio::test]
async fn test_puck_status_across_dewar() {
    let (beamline, sim) =
        Beamline::simulated(&BeamlineConfig::default(), &SimConfig::default()).unwrap();
    sim.post(beamline.dewar.sector(7).unwrap().a.status.pv(), 0i64)
        .unwrap();

    assert_eq!(beamline.dewar.get_puck_status("7A").await.unwrap(), 0);
    assert_eq!(beamline.dewar.get_puck_status("8C").await.unwrap(), 1);
    assert!(beamline.dewar.get_puck_status("7").await.is_err());
}

#[tokio::test]
async fn test_robot_speed() {
    let beamline = instant();
    let robot = &beamline.robot_arm;

    assert!(robot.is_full_speed().await.unwrap());
    robot.set_speed(60.0).await.unwrap();
    assert!(!robot.is_full_speed().await.unwrap());
    robot.set_speed(100.0).await.unwrap();
    assert!(robot.is_full_speed().await.unwrap());
}

#[tokio::test]
async fn test_goniometer_moves_by_alias() {
    let beamline = instant();
    let gonio = &beamline.gonio;

    gonio.axis("omega").unwrap().move_and_wait(45.0, None).await.unwrap();
    gonio.axis("cz").unwrap().move_and_wait(0.125, None).await.unwrap();

    let positions = gonio.read_positions().await.unwrap();
    assert_eq!(positions["omega"], 45.0);
    assert_eq!(positions["z"], 0.125);
    assert_eq!(gonio.pz.position().await.unwrap(), 0.125);
}

#[tokio::test]
async fn test_goniometer_soft_limits() {
    let beamline = instant();
    let gx = &beamline.gonio.gx;
    gx.low_limit_travel.set(-1.0).await.unwrap();
    gx.high_limit_travel.set(1.0).await.unwrap();

    let err = gx.move_and_wait(2.0, None).await.unwrap_err();
    assert!(matches!(err, MxError::SoftLimit { .. }));
    assert_eq!(gx.position().await.unwrap(), 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_cryostream_ramp() {
    let config = SimConfig::with_mode(MockMode::Realistic);
    let (beamline, _) = Beamline::simulated(&BeamlineConfig::default(), &config).unwrap();

    let reached = beamline
        .cryostream
        .ramp_to(110.0, Some(Duration::from_secs(30)))
        .await
        .unwrap();
    assert_eq!(reached, 110.0);
}

#[tokio::test]
async fn test_positions_snapshot() {
    let beamline = instant();
    beamline.work_pos.gpy.set(-0.5).await.unwrap();

    let work = beamline.work_pos.snapshot().await.unwrap();
    let mount = beamline.mount_pos.snapshot().await.unwrap();

    assert_eq!(work["gpy"], -0.5);
    assert_eq!(
        mount.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["gx", "o", "py", "pz"]
    );
}

#[test]
fn test_device_categories_and_names() {
    let beamline = instant();
    let names: Vec<_> = beamline.devices().iter().map(|d| d.name().to_string()).collect();
    assert_eq!(
        names,
        vec!["cryostream", "gonio", "work_pos", "mount_pos", "dewar", "robot_arm"]
    );
    assert_eq!(beamline.dewar.category().label(), "Sample Storage");
}

#[tokio::test]
async fn test_beamline_shares_one_client() {
    let (beamline, sim) =
        Beamline::simulated(&BeamlineConfig::default(), &SimConfig::default()).unwrap();
    let client = sim.client();

    client
        .put(beamline.robot_arm.speed.pv(), 42.0.into())
        .await
        .unwrap();
    assert_eq!(beamline.robot_arm.speed.get().await.unwrap(), 42.0);
}

#[test]
fn test_shipped_config_is_valid() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/beamline.toml");
    let config = BeamlineConfig::load(Some(&path)).unwrap();

    assert_eq!(config.dewar.rotation_timeout(), Some(Duration::from_secs(120)));
    assert_eq!(config.cryostream.atol, 0.1);
}
