//! wsprobe - display server probe
//!
//! Connects to the window server, opens one window and logs every event it
//! receives until the window is closed.

use std::env;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use wsclient::protocol::MessageKind;
use wsclient::{Client, ClientConfig, Rect, WindowFlags};

fn print_usage() {
    println!("wsprobe v{}", wsclient::VERSION);
    println!("Opens a window on the display server and logs its events");
    println!();
    println!("Usage: wsprobe [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -socket <path>        Server socket (default: $WSCLIENT_SOCKET or /run/wsserver.sock)");
    println!("  -timeout <ms>         Reply timeout in milliseconds, 0 waits forever");
    println!("  -h, --help            Show this help message");
    println!();
}

#[derive(Debug)]
struct Config {
    socket_path: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            socket_path: None,
            timeout: Some(Duration::from_secs(5)),
        }
    }
}

fn parse_args() -> Result<Config, String> {
    let mut config = Config::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                process::exit(0);
            }
            "-socket" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for -socket".to_string());
                }
                config.socket_path = Some(PathBuf::from(&args[i]));
            }
            "-timeout" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for -timeout".to_string());
                }
                let ms: u64 = args[i]
                    .parse()
                    .map_err(|_| "Invalid timeout".to_string())?;
                config.timeout = (ms > 0).then(|| Duration::from_millis(ms));
            }
            arg => {
                return Err(format!("Unknown option: {}", arg));
            }
        }
        i += 1;
    }

    Ok(config)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {}", err);
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };

    let mut client_config = ClientConfig::from_env().with_reply_timeout(config.timeout);
    if let Some(path) = config.socket_path {
        client_config = client_config.with_socket_path(path);
    }

    log::info!("wsprobe v{}", wsclient::VERSION);
    log::info!("Server socket: {}", client_config.socket_path.display());

    let client = match Client::connect(client_config) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: cannot connect: {}", e);
            process::exit(1);
        }
    };

    let window = match client.create_window(
        "wsprobe",
        Rect::new(100, 100, 320, 240),
        WindowFlags::VISIBLE,
    ) {
        Ok(id) => id,
        Err(e) => {
            eprintln!("Error: cannot create window: {}", e);
            process::exit(1);
        }
    };
    log::info!("Window {} created", window);

    loop {
        match client.process_event(true) {
            Ok(Some(msg)) => {
                log::info!(
                    "{} seq={} src={} dest={} {:?}",
                    msg.kind,
                    msg.seqid,
                    msg.src,
                    msg.dest,
                    msg.payload
                );
                if msg.kind == MessageKind::WinClosing && msg.dest == window {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                log::error!("Event loop failed: {}", e);
                process::exit(1);
            }
        }
    }

    client.shutdown();
    log::info!("Window closed, exiting");
}
