use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::process::SimProcess;
use super::protocol::{Incoming, Outgoing, Telemetry};
use crate::config::SimConfig;
use crate::encoder::Frame;
use crate::env::{info_keys, Environment, Step, StepInfo};
use crate::error::EnvError;
use crate::policy::Action;

const CONNECT_RETRY: Duration = Duration::from_millis(250);

/// Raw reward and termination rule of the simulator's default task.
#[derive(Debug, Clone, Copy)]
pub struct DriveReward {
    pub max_cte: f64,
}

impl DriveReward {
    pub fn is_done(&self, telemetry: &Telemetry) -> bool {
        telemetry.cte.abs() > self.max_cte || telemetry.collided()
    }

    pub fn reward(&self, telemetry: &Telemetry) -> f64 {
        if telemetry.collided() {
            -2.0
        } else if telemetry.cte.abs() > self.max_cte {
            -1.0
        } else {
            (1.0 - telemetry.cte.abs() / self.max_cte) * telemetry.speed
        }
    }
}

/// Path length travelled on the ground (x/z) plane since the last reset.
#[derive(Debug, Default, Clone, Copy)]
struct Odometer {
    last: Option<(f64, f64)>,
    distance: f64,
}

impl Odometer {
    fn reset(&mut self) {
        *self = Odometer::default();
    }

    fn advance(&mut self, x: f64, z: f64) -> f64 {
        if let Some((lx, lz)) = self.last {
            self.distance += ((x - lx).powi(2) + (z - lz).powi(2)).sqrt();
        }
        self.last = Some((x, z));
        self.distance
    }
}

/// Client for the Donkey simulator's JSON-over-TCP protocol.
pub struct DonkeySim {
    endpoint: String,
    writer: Option<TcpStream>,
    reader: BufReader<TcpStream>,
    reward: DriveReward,
    odometer: Odometer,
    seed: Option<u64>,
    process: Option<SimProcess>,
}

impl DonkeySim {
    /// Launch the simulator if an executable is configured, connect, load the
    /// scene and configure the car and camera.
    pub fn launch(config: &SimConfig) -> Result<Self, EnvError> {
        let process = match &config.executable_path {
            Some(path) => Some(SimProcess::spawn(
                path,
                config.port,
                Duration::from_secs_f64(config.start_delay_secs),
            )?),
            None => None,
        };
        let mut sim = Self::connect(config)?;
        sim.process = process;
        Ok(sim)
    }

    /// Connect to an already running simulator.
    pub fn connect(config: &SimConfig) -> Result<Self, EnvError> {
        let endpoint = config.endpoint();
        let stream = connect_with_retry(
            &endpoint,
            Duration::from_secs_f64(config.connect_timeout_secs),
        )?;
        stream
            .set_read_timeout(Some(Duration::from_secs_f64(config.step_timeout_secs)))
            .map_err(|source| EnvError::SimulatorConnection {
                endpoint: endpoint.clone(),
                source,
            })?;
        stream.set_nodelay(true)?;
        let reader = BufReader::new(stream.try_clone()?);

        let mut sim = DonkeySim {
            endpoint,
            writer: Some(stream),
            reader,
            reward: DriveReward {
                max_cte: config.max_cross_track_error,
            },
            odometer: Odometer::default(),
            seed: None,
            process: None,
        };
        sim.handshake(config)?;
        info!(endpoint = %sim.endpoint, scene = %config.scene, car = %config.car_identifier, "connected to simulator");
        Ok(sim)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn handshake(&mut self, config: &SimConfig) -> Result<(), EnvError> {
        loop {
            match self.receive()? {
                Incoming::SceneSelectionReady => {
                    debug!(scene = %config.scene, "loading scene");
                    self.send(&Outgoing::LoadScene {
                        scene_name: config.scene.clone(),
                    })?;
                }
                Incoming::CarLoaded | Incoming::NeedCarConfig => break,
                Incoming::Aborted => return Err(EnvError::SimulatorClosed),
                Incoming::Telemetry(_) | Incoming::Unknown => {}
            }
        }
        self.send(&Outgoing::car_config(&config.body_style, &config.car_identifier))?;
        self.send(&Outgoing::cam_config(config.camera_width, config.camera_height))?;
        Ok(())
    }

    fn send(&mut self, message: &Outgoing) -> Result<(), EnvError> {
        let line = message.to_line()?;
        let stream = self.writer.as_mut().ok_or(EnvError::Closed)?;
        stream
            .write_all(line.as_bytes())
            .map_err(|e| classify_io(&self.endpoint, e))
    }

    fn receive(&mut self) -> Result<Incoming, EnvError> {
        if self.writer.is_none() {
            return Err(EnvError::Closed);
        }
        let mut line = String::new();
        loop {
            line.clear();
            let n = self
                .reader
                .read_line(&mut line)
                .map_err(|e| classify_io(&self.endpoint, e))?;
            if n == 0 {
                return Err(EnvError::SimulatorClosed);
            }
            if !line.trim().is_empty() {
                return Incoming::parse(line.trim());
            }
        }
    }

    fn next_telemetry(&mut self) -> Result<Telemetry, EnvError> {
        loop {
            match self.receive()? {
                Incoming::Telemetry(t) => return Ok(t),
                Incoming::Aborted => return Err(EnvError::SimulatorClosed),
                other => debug!(message = ?other, "ignoring non-telemetry message"),
            }
        }
    }

    /// Waits for one telemetry message, then skips ahead to the newest one
    /// already sitting in the read buffer. Never blocks past the first.
    fn latest_telemetry(&mut self) -> Result<Telemetry, EnvError> {
        let mut latest = self.next_telemetry()?;
        let mut skipped = 0usize;
        while self.has_buffered_line() {
            match self.receive()? {
                Incoming::Telemetry(t) => {
                    latest = t;
                    skipped += 1;
                }
                Incoming::Aborted => return Err(EnvError::SimulatorClosed),
                other => debug!(message = ?other, "ignoring non-telemetry message"),
            }
        }
        if skipped > 0 {
            debug!(skipped, "dropped stale telemetry");
        }
        Ok(latest)
    }

    /// True when a complete non-blank line is buffered. Blank lines are consumed.
    fn has_buffered_line(&mut self) -> bool {
        loop {
            let buffered = self.reader.buffer();
            let Some(end) = buffered.iter().position(|b| *b == b'\n') else {
                return false;
            };
            if !buffered[..end].iter().all(u8::is_ascii_whitespace) {
                return true;
            }
            self.reader.consume(end + 1);
        }
    }

    fn info(&mut self, telemetry: &Telemetry) -> StepInfo {
        let distance = self.odometer.advance(telemetry.pos_x, telemetry.pos_z);
        StepInfo::from([
            (info_keys::DISTANCE.to_string(), distance),
            (info_keys::SPEED.to_string(), telemetry.speed),
            (info_keys::CTE.to_string(), telemetry.cte),
            (info_keys::HIT.to_string(), f64::from(u8::from(telemetry.collided()))),
            (info_keys::POS_X.to_string(), telemetry.pos_x),
            (info_keys::POS_Y.to_string(), telemetry.pos_y),
            (info_keys::POS_Z.to_string(), telemetry.pos_z),
        ])
    }
}

fn connect_with_retry(endpoint: &str, timeout: Duration) -> Result<TcpStream, EnvError> {
    let deadline = Instant::now() + timeout;
    loop {
        let attempt = endpoint.to_socket_addrs().and_then(|mut addrs| {
            addrs
                .next()
                .ok_or_else(|| std::io::Error::new(ErrorKind::NotFound, "no address resolved"))
        });
        let result = attempt.and_then(|addr| {
            let remaining = deadline.saturating_duration_since(Instant::now());
            TcpStream::connect_timeout(&addr, remaining.max(CONNECT_RETRY))
        });
        match result {
            Ok(stream) => return Ok(stream),
            Err(source) if Instant::now() >= deadline => {
                return Err(EnvError::SimulatorConnection {
                    endpoint: endpoint.to_string(),
                    source,
                })
            }
            Err(e) => {
                debug!(endpoint, error = %e, "simulator not reachable yet, retrying");
                thread::sleep(CONNECT_RETRY);
            }
        }
    }
}

fn classify_io(endpoint: &str, e: std::io::Error) -> EnvError {
    match e.kind() {
        ErrorKind::UnexpectedEof
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe => EnvError::SimulatorClosed,
        _ => EnvError::SimulatorConnection {
            endpoint: endpoint.to_string(),
            source: e,
        },
    }
}

impl Environment for DonkeySim {
    type Observation = Frame;
    type Info = StepInfo;

    fn reset(&mut self) -> Result<Frame, EnvError> {
        self.send(&Outgoing::ResetCar)?;
        self.odometer.reset();
        let telemetry = self.latest_telemetry()?;
        self.odometer.advance(telemetry.pos_x, telemetry.pos_z);
        telemetry.frame()
    }

    fn step(&mut self, action: &Action) -> Result<Step<Frame, StepInfo>, EnvError> {
        self.send(&Outgoing::control(action.steering, action.throttle))?;
        let telemetry = self.latest_telemetry()?;
        let done = self.reward.is_done(&telemetry);
        let reward = self.reward.reward(&telemetry);
        let info = self.info(&telemetry);
        Ok(Step {
            observation: telemetry.frame()?,
            reward,
            done,
            info,
        })
    }

    fn seed(&mut self, seed: u64) {
        // The simulator's physics has no seedable state; remember it for logs.
        self.seed = Some(seed);
        debug!(seed, "simulator seeded");
    }

    fn close(&mut self) -> Result<(), EnvError> {
        if self.writer.is_none() {
            return Ok(());
        }
        if let Err(e) = self.send(&Outgoing::ExitScene) {
            warn!(error = %e, "failed to send exit_scene");
        }
        if self.process.is_some() {
            if let Err(e) = self.send(&Outgoing::QuitApp) {
                warn!(error = %e, "failed to send quit_app");
            }
        }
        if let Some(stream) = self.writer.take() {
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                debug!(error = %e, "socket already shut down");
            }
        }
        self.process = None;
        info!(endpoint = %self.endpoint, seed = ?self.seed, "simulator connection closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::protocol::encode_png;
    use std::net::TcpListener;
    use std::sync::mpsc;

    fn telemetry_line(cte: f64, speed: f64, x: f64, z: f64, hit: &str) -> String {
        format!(
            "{{\"msg_type\":\"telemetry\",\"image\":\"{}\",\"speed\":{speed},\"cte\":{cte},\"hit\":\"{hit}\",\"pos_x\":{x},\"pos_y\":0.0,\"pos_z\":{z}}}\n",
            encode_png(4, 4, [10, 20, 30])
        )
    }

    /// Fake simulator: handshake, then answer every reset/control with the
    /// next scripted telemetry line. Received message types go to `seen`.
    fn spawn_fake_sim(script: Vec<String>) -> (u16, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            stream
                .write_all(b"{\"msg_type\":\"scene_selection_ready\"}\n")
                .unwrap();
            let mut script = script.into_iter();
            let mut line = String::new();
            loop {
                line.clear();
                if reader.read_line(&mut line).unwrap_or(0) == 0 {
                    break;
                }
                let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
                let kind = value["msg_type"].as_str().unwrap_or_default().to_string();
                let _ = tx.send(kind.clone());
                match kind.as_str() {
                    "load_scene" => stream.write_all(b"{\"msg_type\":\"car_loaded\"}\n").unwrap(),
                    "reset_car" | "control" => match script.next() {
                        Some(reply) => {
                            stream.write_all(b"{\"msg_type\":\"protocol_version\"}\n").unwrap();
                            stream.write_all(reply.as_bytes()).unwrap();
                        }
                        None => break,
                    },
                    _ => {}
                }
            }
        });
        (port, rx)
    }

    fn config(port: u16) -> SimConfig {
        let mut config = SimConfig::new("127.0.0.1", port, "test-car", 4.0);
        config.connect_timeout_secs = 2.0;
        config.step_timeout_secs = 2.0;
        config
    }

    #[test]
    fn test_reset_and_step_report_telemetry() {
        let (port, seen) = spawn_fake_sim(vec![
            telemetry_line(0.0, 0.0, 0.0, 0.0, "none"),
            telemetry_line(1.0, 2.0, 3.0, 4.0, "none"),
            telemetry_line(5.0, 1.0, 3.0, 4.0, "none"),
        ]);
        let mut sim = DonkeySim::connect(&config(port)).unwrap();

        let frame = sim.reset().unwrap();
        assert_eq!(frame.shape(), [4, 4, 3]);

        let step = sim.step(&Action::new(0.1, 0.3)).unwrap();
        assert!(!step.done);
        assert!((step.reward - 0.75 * 2.0).abs() < 1e-9);
        assert!((step.info[info_keys::DISTANCE] - 5.0).abs() < 1e-9);
        assert_eq!(step.info[info_keys::SPEED], 2.0);

        let step = sim.step(&Action::new(0.0, 0.3)).unwrap();
        assert!(step.done, "cte 5.0 exceeds max 4.0");
        assert_eq!(step.reward, -1.0);

        sim.close().unwrap();
        let kinds: Vec<String> = seen.try_iter().collect();
        assert_eq!(
            &kinds[..6],
            &["load_scene", "car_config", "cam_config", "reset_car", "control", "control"]
        );
    }

    #[test]
    fn test_collision_ends_episode_with_penalty() {
        let (port, _seen) = spawn_fake_sim(vec![
            telemetry_line(0.0, 0.0, 0.0, 0.0, "none"),
            telemetry_line(0.5, 1.0, 0.0, 1.0, "wall"),
        ]);
        let mut sim = DonkeySim::connect(&config(port)).unwrap();
        sim.reset().unwrap();
        let step = sim.step(&Action::new(0.0, 1.0)).unwrap();
        assert!(step.done);
        assert_eq!(step.reward, -2.0);
        assert_eq!(step.info[info_keys::HIT], 1.0);
    }

    #[test]
    fn test_step_reports_newest_buffered_telemetry() {
        let burst = [
            telemetry_line(0.5, 1.0, 0.0, 1.0, "none"),
            "\n".to_string(),
            telemetry_line(0.25, 3.0, 0.0, 2.0, "none"),
        ]
        .concat();
        let (port, _seen) =
            spawn_fake_sim(vec![telemetry_line(0.0, 0.0, 0.0, 0.0, "none"), burst]);
        let mut sim = DonkeySim::connect(&config(port)).unwrap();
        sim.reset().unwrap();

        let step = sim.step(&Action::new(0.0, 0.5)).unwrap();
        assert_eq!(step.info[info_keys::SPEED], 3.0);
        assert_eq!(step.info[info_keys::CTE], 0.25);
        assert!((step.info[info_keys::DISTANCE] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_disconnect_mid_episode_is_connection_error() {
        let (port, _seen) = spawn_fake_sim(vec![telemetry_line(0.0, 0.0, 0.0, 0.0, "none")]);
        let mut sim = DonkeySim::connect(&config(port)).unwrap();
        sim.reset().unwrap();
        let err = sim.step(&Action::new(0.0, 0.5)).unwrap_err();
        assert!(err.is_connection_error(), "got {err}");
    }

    #[test]
    fn test_unreachable_simulator_fails_with_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut config = config(port);
        config.connect_timeout_secs = 0.3;
        let err = DonkeySim::connect(&config).err().expect("connect must fail");
        match err {
            EnvError::SimulatorConnection { endpoint, .. } => {
                assert_eq!(endpoint, format!("127.0.0.1:{port}"))
            }
            other => panic!("expected SimulatorConnection, got {other}"),
        }
    }

    #[test]
    fn test_close_is_idempotent() {
        let (port, seen) = spawn_fake_sim(vec![]);
        let mut sim = DonkeySim::connect(&config(port)).unwrap();
        sim.close().unwrap();
        sim.close().unwrap();
        assert!(matches!(sim.reset(), Err(EnvError::Closed)));

        // Give the fake time to drain the socket.
        thread::sleep(Duration::from_millis(100));
        let exits = seen.try_iter().filter(|k| k == "exit_scene").count();
        assert_eq!(exits, 1);
    }

    #[test]
    fn test_odometer_accumulates_planar_distance() {
        let mut odo = Odometer::default();
        assert_eq!(odo.advance(0.0, 0.0), 0.0);
        assert_eq!(odo.advance(3.0, 4.0), 5.0);
        assert_eq!(odo.advance(3.0, 5.0), 6.0);
        odo.reset();
        assert_eq!(odo.advance(10.0, 10.0), 0.0);
    }
}
