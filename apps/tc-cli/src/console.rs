//! Line-oriented tuning console on stdin.

use std::io::BufRead;

use tc_controls::{ControllerParameters, ParamValue};
use tc_loop::{StopSignal, TuningHandle};

pub const HELP: &str = "commands: list | get <name> | set <name> key=value ... | stop | help";

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    List,
    Get(String),
    Set(String, ControllerParameters),
    Stop,
    Help,
}

pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let command = match verb {
        "list" | "ls" => ConsoleCommand::List,
        "get" => ConsoleCommand::Get(words.next().ok_or("usage: get <name>")?.to_string()),
        "set" => {
            let name = words.next().ok_or("usage: set <name> key=value ...")?;
            let mut overrides = ControllerParameters::new();
            for pair in words {
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| format!("expected key=value, got '{pair}'"))?;
                overrides.insert(key, ParamValue::parse(value));
            }
            if overrides.is_empty() {
                return Err("set needs at least one key=value".into());
            }
            ConsoleCommand::Set(name.to_string(), overrides)
        }
        "stop" | "quit" | "q" => ConsoleCommand::Stop,
        "help" | "?" => ConsoleCommand::Help,
        other => return Err(format!("unknown command '{other}' ({HELP})")),
    };
    Ok(Some(command))
}

/// Serve commands from `input` until it ends or `stop` is typed.
pub fn serve<R: BufRead>(input: R, tuning: &TuningHandle, stop: &StopSignal) {
    for line in input.lines() {
        let Ok(line) = line else { break };
        match parse_command(&line) {
            Ok(None) => {}
            Ok(Some(ConsoleCommand::Help)) => println!("{HELP}"),
            Ok(Some(ConsoleCommand::Stop)) => {
                stop.request_stop();
                println!("stopping...");
                return;
            }
            Ok(Some(ConsoleCommand::List)) => match tuning.list() {
                Ok(names) => println!("{}", names.join(", ")),
                Err(e) => {
                    println!("✗ {e}");
                    return;
                }
            },
            Ok(Some(ConsoleCommand::Get(name))) => match tuning.get(&name) {
                Ok(params) => println!("{name}: {params}"),
                Err(e) => println!("✗ {e}"),
            },
            Ok(Some(ConsoleCommand::Set(name, overrides))) => match tuning.set(&name, overrides) {
                Ok(params) => println!("✓ {name}: {params}"),
                Err(e) => println!("✗ {e}"),
            },
            Err(message) => println!("✗ {message}"),
        }
    }
}
