//! Loopback protocol doubles.

use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::thread;

use serde_json::Value;

use crate::conn::http;
use crate::descriptor::CameraEndpoint;

/// Feeds every accepted connection to the handler, one at a time.
pub(crate) fn spawn_server<F>(mut handle: F) -> u16
where
    F: FnMut(TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback listener");
    let port = listener.local_addr().expect("listener addr").port();
    thread::spawn(move || {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => handle(stream),
                Err(_) => break,
            }
        }
    });
    port
}

/// Camera double: answers one JSON command per connection.
pub(crate) fn spawn_camera<F>(mut respond: F) -> CameraEndpoint
where
    F: FnMut(&Value) -> Value + Send + 'static,
{
    let port = spawn_server(move |mut stream| {
        if let Some(request) = read_command(&mut stream) {
            respond_json(&mut stream, &respond(&request));
        }
    });
    CameraEndpoint {
        host: "127.0.0.1".to_owned(),
        port,
        path: "/sony/camera".to_owned(),
    }
}

fn read_command(stream: &mut TcpStream) -> Option<Value> {
    let (head, early) = http::read_head(stream).ok()?;
    let total = http::content_length(&head);
    let body = http::read_body(stream, total, early, |_, _| {}).ok()?;
    serde_json::from_slice(&body).ok()
}

pub(crate) fn read_request_line(stream: &mut TcpStream) -> String {
    http::read_head(stream)
        .map(|(head, _)| head.lines().next().unwrap_or_default().to_owned())
        .unwrap_or_default()
}

pub(crate) fn respond_json(stream: &mut TcpStream, body: &Value) {
    let raw = body.to_string();
    respond_bytes(stream, raw.len(), raw.as_bytes());
}

/// Declares `declared` body bytes but carries only `body`; undersized
/// bodies simulate a dropped transfer.
pub(crate) fn respond_bytes(stream: &mut TcpStream, declared: usize, body: &[u8]) {
    let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", declared);
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body);
}

pub(crate) fn method_of(request: &Value) -> String {
    request
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}
