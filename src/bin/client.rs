//! Interactive line client with per-command RTT display.
//!
//! Usage: `client [host] [port]` (default 127.0.0.1 8080)
//!
//! Type commands like:
//!   NEW BUY 100 @ 50.25
//!   NEW SELL 60 @ 50.10
//!   CXL 1
//!   QUIT

use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;
use std::process::ExitCode;
use std::time::{Duration, Instant};

fn main() -> ExitCode {
    let host = std::env::args().nth(1).unwrap_or_else(|| "127.0.0.1".to_owned());
    let port: u16 = std::env::args()
        .nth(2)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(8080);

    let stream = match TcpStream::connect((host.as_str(), port)) {
        Ok(stream) => stream,
        Err(err) => {
            eprintln!("connect to {}:{} failed: {}", host, port, err);
            return ExitCode::FAILURE;
        }
    };
    let _ = stream.set_nodelay(true);

    let mut writer = match stream.try_clone() {
        Ok(writer) => writer,
        Err(err) => {
            eprintln!("stream clone failed: {}", err);
            return ExitCode::FAILURE;
        }
    };
    let mut reader = BufReader::new(stream);
    let mut line = String::new();

    println!("Connected to {}:{}. Commands:", host, port);
    println!("  NEW BUY 100 @ 50.25");
    println!("  NEW SELL 60 @ 50.10");
    println!("  QUIT");
    println!();

    let stdin = io::stdin();
    for input in stdin.lock().lines() {
        let Ok(input) = input else { break };
        if input.is_empty() {
            continue;
        }

        let t0 = Instant::now();
        if writer.write_all(format!("{}\n", input).as_bytes()).is_err() {
            eprintln!("send failed");
            break;
        }

        // Wait for the first reply line (the ACK)
        let _ = reader.get_ref().set_read_timeout(None);
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => {
                println!("Server closed.");
                return ExitCode::SUCCESS;
            }
            Ok(_) => {}
        }
        let rtt_us = t0.elapsed().as_micros();
        print!("{}", line);
        println!("RTT: {} us", rtt_us);

        // Drain the remaining lines for this command
        let _ = reader.get_ref().set_read_timeout(Some(Duration::from_millis(100)));
        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => {
                    println!("Server closed.");
                    return ExitCode::SUCCESS;
                }
                Ok(_) => {
                    print!("{}", line);
                    if line.trim_end() == "BYE" {
                        return ExitCode::SUCCESS;
                    }
                }
                Err(_) => break, // quiet; assume no more lines for this command
            }
        }
    }

    ExitCode::SUCCESS
}
