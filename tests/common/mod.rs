//! Shared helpers for driving a real socks5d instance over loopback.

use socks5d::config::Config;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

/// Spawns `runtime::run` on a background thread with the given socks/mgmt
/// ports on loopback, and a distinct log directory per call so parallel
/// tests don't race on the same file. Never joined: the test process exit
/// tears the thread down with it.
pub fn spawn_server(socks_port: u16, mgmt_port: u16, users: Vec<(&str, &str)>, dissector_enabled: bool) {
    let config = Config {
        socks_listen: "127.0.0.1".to_string(),
        socks_port,
        mgmt_listen: "127.0.0.1".to_string(),
        mgmt_port,
        users: users.into_iter().map(|(u, p)| (u.to_string(), p.to_string())).collect(),
        dissector_enabled,
        log_level: "error".to_string(),
        log_dir: std::env::temp_dir().join(format!("socks5d-test-log-{socks_port}")),
    };
    std::thread::spawn(move || {
        let _ = socks5d::runtime::run(config);
    });
    wait_for_port(("127.0.0.1", socks_port));
}

fn wait_for_port(addr: impl std::net::ToSocketAddrs) {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        if TcpStream::connect(&addr).is_ok() {
            return;
        }
        if Instant::now() > deadline {
            panic!("server did not start listening in time");
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

pub fn connect(port: u16) -> TcpStream {
    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
    TcpStream::connect(addr).expect("connect to socks listener")
}

/// Sends the no-auth method-select frame (VER=5, one method: NO_AUTH).
pub fn send_no_auth_negotiation(stream: &mut TcpStream) {
    stream.write_all(&[0x05, 0x01, 0x00]).unwrap();
}

/// Sends a method-select frame offering both NO_AUTH and USER_PASS.
pub fn send_negotiation(stream: &mut TcpStream, methods: &[u8]) {
    let mut frame = vec![0x05, methods.len() as u8];
    frame.extend_from_slice(methods);
    stream.write_all(&frame).unwrap();
}

pub fn read_exact_n(stream: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    stream.read_exact(&mut buf).unwrap();
    buf
}

pub fn send_user_pass(stream: &mut TcpStream, user: &str, pass: &str) {
    let mut frame = vec![0x01, user.len() as u8];
    frame.extend_from_slice(user.as_bytes());
    frame.push(pass.len() as u8);
    frame.extend_from_slice(pass.as_bytes());
    stream.write_all(&frame).unwrap();
}

pub fn send_connect_ipv4(stream: &mut TcpStream, ip: [u8; 4], port: u16) {
    let mut frame = vec![0x05, 0x01, 0x00, 0x01];
    frame.extend_from_slice(&ip);
    frame.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&frame).unwrap();
}

pub fn send_connect_domain(stream: &mut TcpStream, domain: &str, port: u16) {
    let mut frame = vec![0x05, 0x01, 0x00, 0x03, domain.len() as u8];
    frame.extend_from_slice(domain.as_bytes());
    frame.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&frame).unwrap();
}

pub fn send_bind_ipv4(stream: &mut TcpStream, ip: [u8; 4], port: u16) {
    let mut frame = vec![0x05, 0x02, 0x00, 0x01]; // CMD=BIND
    frame.extend_from_slice(&ip);
    frame.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&frame).unwrap();
}

/// Spins up a throwaway TCP origin: accepts exactly one connection on a
/// background thread and echoes back whatever it reads, until EOF.
pub fn spawn_echo_origin() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    std::thread::spawn(move || {
        if let Ok((mut sock, _)) = listener.accept() {
            let mut buf = [0u8; 4096];
            loop {
                match sock.read(&mut buf) {
                    Ok(0) | Err(_) => return,
                    Ok(n) => {
                        if sock.write_all(&buf[..n]).is_err() {
                            return;
                        }
                    }
                }
            }
        }
    });
    port
}
