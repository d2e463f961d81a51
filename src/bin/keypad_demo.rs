//! Key chain demo for the keypad timing core
//!
//! Builds a chain, drives it with the tick engine and logs every HID
//! actuation instead of sending it to hardware.
//!
//! Usage:
//!   cargo run --bin keypad_demo -- --demo 1              # Run built-in demo 1
//!   cargo run --bin keypad_demo -- --script "ctrl tap=c fin after=20 tap=hi"
//!   cargo run --bin keypad_demo -- --demo 3 --realtime   # Pace ticks in wall time
//!
//! Demos:
//!   1. Copy/paste    - ctrl+c, a pause, then ctrl+v
//!   2. Typing        - a string expanded into one tap per character
//!   3. Repeat        - arrow taps repeated with idle ticks between rounds
//!   4. Nested        - a modifier block inside a repeat block

use clap::Parser;
use keypad_timing::{
    Arg, Engine, HidActuator, Key, KeyChain, KeyCode, KeypadConfig, SchedulerMode, SharedActuator,
};
use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "keypad_demo", about = "Drive key chains against a logging actuator")]
struct Cli {
    /// Built-in demo to run (1-4).
    #[arg(short, long, conflicts_with = "script")]
    demo: Option<u8>,

    /// Whitespace-separated operations, e.g. "times=2 shift tap=a fin".
    #[arg(short, long)]
    script: Option<String>,

    /// Pace ticks in wall time instead of stepping as fast as possible.
    #[arg(short, long)]
    realtime: bool,

    /// TOML config file (KEYPAD_* env vars override it).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Actuator that logs each call with the tick it happened on.
struct LoggingActuator {
    clock: Rc<Cell<u64>>,
}

impl HidActuator for LoggingActuator {
    fn key_down(&mut self, key: Key) {
        info!(tick = self.clock.get(), %key, "key down");
    }

    fn key_up(&mut self, key: Key) {
        info!(tick = self.clock.get(), %key, "key up");
    }

    fn modifier_down(&mut self, code: KeyCode) {
        info!(tick = self.clock.get(), %code, "modifier down");
    }

    fn modifier_up(&mut self, code: KeyCode) {
        info!(tick = self.clock.get(), %code, "modifier up");
    }
}

fn build_demo(chain: &mut KeyChain, demo: u8) -> Result<(), Box<dyn std::error::Error>> {
    match demo {
        1 => {
            println!("\n=== Demo 1: Copy/Paste ===");
            chain.ctrl().tap('c').fin().after(20).ctrl().tap('v').fin();
        }
        2 => {
            println!("\n=== Demo 2: Typing ===");
            chain.tap("hello, keypad");
        }
        3 => {
            println!("\n=== Demo 3: Repeat ===");
            chain.times(4).space(5).down().end().fin();
        }
        4 => {
            println!("\n=== Demo 4: Nested ===");
            chain.times(2).apart(3).shift().tap("ab").fin().home().fin();
        }
        other => return Err(format!("Invalid demo {}. Must be 1-4.", other).into()),
    }
    Ok(())
}

/// Parse `name` or `name=arg[,arg...]`.
fn run_script(chain: &mut KeyChain, script: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("\n=== Script ===");
    for token in script.split_whitespace() {
        let (name, raw) = match token.split_once('=') {
            Some((name, raw)) => (name, Some(raw)),
            None => (token, None),
        };
        let args: Vec<Arg> = raw
            .map(|r| r.split(',').map(parse_arg).collect())
            .unwrap_or_default();

        chain.select(name)?;
        chain.invoke(&args)?;
    }
    Ok(())
}

fn parse_arg(raw: &str) -> Arg {
    if let Ok(n) = raw.parse::<i64>() {
        return Arg::Int(n);
    }
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Arg::from(c),
        _ => Arg::from(raw),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = KeypadConfig::load(cli.config.as_deref())?;
    let mode = if cli.realtime {
        SchedulerMode::Realtime
    } else {
        SchedulerMode::Offline
    };
    let mut engine = Engine::new(mode, config.clone());

    let hid: SharedActuator = Rc::new(RefCell::new(LoggingActuator {
        clock: engine.queue().clock(),
    }));

    {
        let mut chain = engine.chain(&hid);
        match (&cli.script, cli.demo) {
            (Some(script), _) => run_script(&mut chain, script)?,
            (None, Some(demo)) => build_demo(&mut chain, demo)?,
            (None, None) => build_demo(&mut chain, 1)?,
        }
    }

    let queue = engine.queue().clone();
    engine.run_until(|| queue.is_idle());
    println!(
        "Finished after {} ticks ({} ms at {} ms/tick).",
        queue.now(),
        queue.now() * config.tick_interval_ms,
        config.tick_interval_ms
    );
    Ok(())
}
