//! UDP market-data listener - prints each datagram payload as one line.
//!
//! Usage: `md_listen [port]` (default 9001)

use std::net::UdpSocket;
use std::process::ExitCode;

fn main() -> ExitCode {
    let port: u16 = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(9001);

    let socket = match UdpSocket::bind(("0.0.0.0", port)) {
        Ok(socket) => socket,
        Err(err) => {
            eprintln!("bind failed on port {}: {}", port, err);
            return ExitCode::FAILURE;
        }
    };

    println!("UDP market data listener on 0.0.0.0:{}", port);

    let mut buf = [0u8; 2048];
    loop {
        match socket.recv(&mut buf) {
            Ok(n) => println!("{}", String::from_utf8_lossy(&buf[..n])),
            Err(err) => {
                eprintln!("recv failed: {}", err);
                return ExitCode::FAILURE;
            }
        }
    }
}
