use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::{debug, error, info, trace, warn};
use nannou_osc as osc;

use super::control_surface::ControlSurface;
use crate::error::DisplayError;

const IDLE_SLEEP: Duration = Duration::from_millis(2);

/// Listens for OSC commands on a UDP port and forwards them to a
/// [`ControlSurface`].
pub struct OscControlServer {
    surface: ControlSurface,
    thread_handle: Option<thread::JoinHandle<()>>,
    thread_running: Arc<AtomicBool>,
}

impl OscControlServer {
    pub fn new(surface: ControlSurface) -> Self {
        Self {
            surface,
            thread_handle: None,
            thread_running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn start(&mut self, port: u16) -> Result<(), DisplayError> {
        self.stop();

        let receiver = osc::Receiver::bind(port).map_err(|err| {
            DisplayError::Config(format!(
                "failed to bind OSC port {}: {}",
                port, err
            ))
        })?;
        let sender = osc::sender().map_err(|err| {
            DisplayError::Config(format!("failed to open OSC sender: {}", err))
        })?;
        let surface = self.surface.clone();
        let running = self.thread_running.clone();

        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("pixframe-osc".to_string())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    let mut processed = false;
                    for (packet, from) in receiver.try_iter() {
                        processed = true;
                        for message in packet.into_msgs() {
                            if let Some(reply) =
                                handle_message(&surface, &message)
                            {
                                send_reply(&sender, reply, from);
                            }
                        }
                    }

                    if !processed {
                        thread::sleep(IDLE_SLEEP);
                    }
                }

                info!("OSC control thread on port {} is exiting", port);
            })
            .map_err(|err| {
                self.thread_running.store(false, Ordering::SeqCst);
                DisplayError::Config(format!(
                    "failed to start OSC thread: {}",
                    err
                ))
            })?;

        self.thread_handle = Some(handle);
        info!("OSC control listening on port {}", port);

        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.thread_running.load(Ordering::SeqCst)
    }

    pub fn stop(&mut self) {
        self.thread_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                error!("OSC control thread panicked");
            }
        }
    }
}

impl Drop for OscControlServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn send_reply(sender: &osc::Sender, reply: osc::Message, to: SocketAddr) {
    trace!("Replying {} to {}", reply.addr, to);
    if let Err(err) = sender.send(osc::Packet::Message(reply), to) {
        warn!("Failed to reply to {}: {:?}", to, err);
    }
}

fn reply(addr: &str, args: Vec<osc::Type>) -> Option<osc::Message> {
    Some(osc::Message {
        addr: addr.to_string(),
        args,
    })
}

fn int_arg(arg: &osc::Type) -> Option<i32> {
    match arg {
        osc::Type::Int(value) => Some(*value),
        osc::Type::Float(value) if value.fract() == 0.0 => Some(*value as i32),
        osc::Type::Double(value) if value.fract() == 0.0 => {
            Some(*value as i32)
        }
        _ => None,
    }
}

/// Applies one OSC message and returns the reply to send, if any.
///
/// Setters only reply when the command is rejected (`/error <message>`);
/// getters reply with the current value under the same address.
pub fn handle_message(
    surface: &ControlSurface,
    message: &osc::Message,
) -> Option<osc::Message> {
    let result = match (message.addr.as_str(), message.args.first()) {
        ("/ping", _) => return reply("/pong", vec![]),
        ("/on", _) => surface.power_on(),
        ("/off", _) => surface.power_off(),
        ("/brightness", None) => {
            let percent = surface.brightness() as i32;
            return reply("/brightness", vec![osc::Type::Int(percent)]);
        }
        ("/brightness", Some(arg)) => match int_arg(arg) {
            Some(percent) => surface.set_brightness(percent),
            None => Err(DisplayError::InvalidArgument(
                "brightness must be an integer".to_string(),
            )),
        },
        ("/source", None) => {
            let source_id = surface.source();
            return reply("/source", vec![osc::Type::String(source_id)]);
        }
        ("/source", Some(osc::Type::String(source_id))) => {
            surface.set_source(source_id)
        }
        ("/source", Some(_)) => Err(DisplayError::InvalidArgument(
            "source must be a string".to_string(),
        )),
        ("/status", _) => {
            let powered = surface.power_state() as i32;
            return reply("/status", vec![osc::Type::Int(powered)]);
        }
        ("/error", _) => {
            let message = surface
                .last_error()
                .map(|err| err.to_string())
                .unwrap_or_default();
            return reply("/error", vec![osc::Type::String(message)]);
        }
        (addr, _) => {
            debug!("Ignoring unknown OSC address {}", addr);
            return None;
        }
    };

    match result {
        Ok(()) => None,
        Err(err) => reply("/error", vec![osc::Type::String(err.to_string())]),
    }
}
