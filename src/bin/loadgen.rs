//! Load generator - parallel clients firing random NEW orders at the
//! exchange and reporting ACK round-trip percentiles.
//!
//! Usage: `loadgen [clients] [orders] [--host <h>] [--port <p>] [--csv <path>]`

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use hdrhistogram::Histogram;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

struct Args {
    host: String,
    port: u16,
    clients: usize,
    orders: usize,
    csv: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        host: "127.0.0.1".to_owned(),
        port: 8080,
        clients: 4,
        orders: 200,
        csv: None,
    };
    let mut positional = 0;
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--csv" => args.csv = Some(iter.next().ok_or("--csv requires a path")?),
            "--host" => args.host = iter.next().ok_or("--host requires a value")?,
            "--port" => {
                args.port = iter
                    .next()
                    .and_then(|v| v.parse().ok())
                    .ok_or("--port requires a port number")?;
            }
            other if !other.starts_with("--") => {
                let value: usize = other.parse().map_err(|_| format!("bad count: {}", other))?;
                match positional {
                    0 => args.clients = value,
                    1 => args.orders = value,
                    _ => return Err("too many positional arguments".to_owned()),
                }
                positional += 1;
            }
            other => return Err(format!("unknown flag: {}", other)),
        }
    }
    Ok(args)
}

/// One client connection: send random orders, record send-to-ACK RTTs,
/// drain trailing event lines with a short timeout.
fn run_client(host: String, port: u16, seed: u64, orders: usize) -> Vec<u64> {
    let mut samples = Vec::with_capacity(orders);

    let stream = match TcpStream::connect((host.as_str(), port)) {
        Ok(stream) => stream,
        Err(err) => {
            eprintln!("connect failed: {}", err);
            return samples;
        }
    };
    let _ = stream.set_nodelay(true);
    let mut writer = match stream.try_clone() {
        Ok(writer) => writer,
        Err(_) => return samples,
    };
    let mut reader = BufReader::new(stream);
    let mut line = String::new();

    let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_mul(1337));

    for _ in 0..orders {
        let pips: i64 = rng.gen_range(-20..=20);
        let px = 50.25 + pips as f64 * 0.01;
        let qty: i32 = rng.gen_range(1..=200);
        let side = if rng.gen_bool(0.5) { "BUY" } else { "SELL" };
        let order = format!("NEW {} {} @ {:.2}\n", side, qty, px);

        let t0 = Instant::now();
        if writer.write_all(order.as_bytes()).is_err() {
            break;
        }

        // First line back is the ACK
        let _ = reader.get_ref().set_read_timeout(None);
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        samples.push(t0.elapsed().as_micros() as u64);

        // Drain the command's event lines until things go quiet
        let _ = reader.get_ref().set_read_timeout(Some(Duration::from_millis(2)));
        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(1..) => {}
                Ok(0) | Err(_) => break,
            }
        }
    }

    let _ = writer.write_all(b"QUIT\n");
    samples
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{}", err);
            eprintln!("usage: loadgen [clients] [orders] [--host <h>] [--port <p>] [--csv <path>]");
            return ExitCode::from(2);
        }
    };

    println!(
        "Running {} clients x {} orders against {}:{} ...",
        args.clients, args.orders, args.host, args.port
    );

    let mut handles = Vec::with_capacity(args.clients);
    for id in 0..args.clients {
        let host = args.host.clone();
        let port = args.port;
        let orders = args.orders;
        handles.push(thread::spawn(move || run_client(host, port, id as u64, orders)));
    }

    let mut histogram = Histogram::<u64>::new_with_bounds(1, 10_000_000, 3)
        .expect("histogram bounds");
    for handle in handles {
        if let Ok(samples) = handle.join() {
            for rtt in samples {
                histogram.record(rtt.max(1)).unwrap_or(());
            }
        }
    }

    if histogram.is_empty() {
        println!("No samples collected.");
        return ExitCode::FAILURE;
    }

    let p50 = histogram.value_at_quantile(0.50);
    let p95 = histogram.value_at_quantile(0.95);
    let p99 = histogram.value_at_quantile(0.99);
    let max = histogram.max();

    println!("Samples: {}", histogram.len());
    println!("p50: {} us", p50);
    println!("p95: {} us", p95);
    println!("p99: {} us", p99);
    println!("max: {} us", max);

    if let Some(path) = args.csv {
        match File::create(&path) {
            Ok(mut csv) => {
                let _ = writeln!(csv, "percentile,value_us");
                let _ = writeln!(csv, "p50,{}", p50);
                let _ = writeln!(csv, "p95,{}", p95);
                let _ = writeln!(csv, "p99,{}", p99);
                let _ = writeln!(csv, "max,{}", max);
                println!("Wrote {}", path);
            }
            Err(err) => eprintln!("could not write {}: {}", path, err),
        }
    }

    ExitCode::SUCCESS
}
