//! Loopback listener for the companion UI surface: `toggleBiasDetection`
//! and `rescan` actions, each acknowledged with a status response.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::Deserialize;
use serde_json::json;
use tiny_http::{Header, Method, Response, Server};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Toggle { enabled: bool },
    Rescan,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    action: String,
    #[serde(default)]
    enabled: Option<bool>,
}

pub struct Listener {
    server: Arc<Server>,
    thread: Option<thread::JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    commands: Receiver<Command>,
    addr: String,
}

impl Listener {
    /// Bind on 127.0.0.1; port 0 picks a free one.
    pub fn start(port: u16) -> Result<Self> {
        let listen_addr = format!("127.0.0.1:{port}");
        let server = Arc::new(
            Server::http(&listen_addr).map_err(|err| anyhow!("control: listen: {err}"))?,
        );
        let addr = server.server_addr().to_string();
        let (tx, rx) = unbounded::<Command>();
        let stop = Arc::new(AtomicBool::new(false));

        let server_handle = server.clone();
        let stop_handle = stop.clone();
        let thread = thread::spawn(move || {
            for request in server_handle.incoming_requests() {
                if stop_handle.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(err) = handle_message(request, &tx) {
                    warn!(%err, "control message failed");
                }
            }
        });

        debug!(%addr, "control listener started");
        Ok(Listener {
            server,
            thread: Some(thread),
            stop,
            commands: rx,
            addr,
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn commands(&self) -> &Receiver<Command> {
        &self.commands
    }

    pub fn close(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.server.unblock();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.close();
    }
}

fn handle_message(mut request: tiny_http::Request, tx: &Sender<Command>) -> Result<()> {
    if request.method() != &Method::Post {
        let _ = request.respond(Response::from_string("method not allowed").with_status_code(405));
        return Ok(());
    }

    let mut body = String::new();
    request.as_reader().read_to_string(&mut body)?;
    let message: MessageBody = match serde_json::from_str(&body) {
        Ok(message) => message,
        Err(err) => {
            respond_json(request, 400, &json!({"error": "malformed message"}))?;
            return Err(anyhow!("control: malformed body: {err}"));
        }
    };

    match message.action.as_str() {
        "toggleBiasDetection" => {
            let Some(enabled) = message.enabled else {
                respond_json(request, 400, &json!({"error": "enabled required"}))?;
                return Ok(());
            };
            tx.send(Command::Toggle { enabled }).ok();
            respond_json(request, 200, &json!({"status": "success"}))
        }
        "rescan" => {
            tx.send(Command::Rescan).ok();
            respond_json(request, 200, &json!({"status": "complete"}))
        }
        other => {
            debug!(action = other, "unknown control action");
            respond_json(request, 400, &json!({"error": "unknown action"}))
        }
    }
}

fn respond_json(
    request: tiny_http::Request,
    status: u16,
    body: &serde_json::Value,
) -> Result<()> {
    let response = Response::from_string(body.to_string())
        .with_status_code(status)
        .with_header(
            Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                .expect("valid header"),
        );
    request
        .respond(response)
        .map_err(|err| anyhow!("control: respond: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn post(addr: &str, body: &str) -> (u16, String) {
        let client = reqwest::blocking::Client::new();
        let resp = client
            .post(format!("http://{addr}/message"))
            .body(body.to_string())
            .send()
            .expect("control request");
        let status = resp.status().as_u16();
        (status, resp.text().unwrap_or_default())
    }

    #[test]
    fn toggle_and_rescan_round_trip() {
        let listener = Listener::start(0).unwrap();
        let addr = listener.addr().to_string();

        let (status, body) = post(&addr, r#"{"action": "toggleBiasDetection", "enabled": false}"#);
        assert_eq!(status, 200);
        assert!(body.contains("success"));

        let (status, body) = post(&addr, r#"{"action": "rescan"}"#);
        assert_eq!(status, 200);
        assert!(body.contains("complete"));

        let first = listener
            .commands()
            .recv_timeout(Duration::from_secs(2))
            .unwrap();
        assert_eq!(first, Command::Toggle { enabled: false });
        let second = listener
            .commands()
            .recv_timeout(Duration::from_secs(2))
            .unwrap();
        assert_eq!(second, Command::Rescan);
    }

    #[test]
    fn unknown_action_is_rejected() {
        let listener = Listener::start(0).unwrap();
        let (status, body) = post(listener.addr(), r#"{"action": "selfDestruct"}"#);
        assert_eq!(status, 400);
        assert!(body.contains("unknown action"));
    }
}
