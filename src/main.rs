use rogerian::{Conversation, Script, compile, farewell, greeting, turn};
use std::fs;
use std::io::{self, BufRead, Write};

fn main() {
    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    if let Err(err) = run(&config) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

struct CliConfig {
    script_path: Option<String>,
    seed: Option<u64>,
    capitalize: bool,
}

fn run(config: &CliConfig) -> Result<(), String> {
    let script = match &config.script_path {
        Some(path) => {
            let raw = fs::read_to_string(path).map_err(|err| format!("failed to read '{path}': {err}"))?;
            serde_json::from_str::<Script>(&raw).map_err(|err| format!("invalid script '{path}': {err}"))?
        }
        None => Script::doctor().clone(),
    };
    let rules = compile(&script).map_err(|err| err.to_string())?;
    let mut session = match config.seed {
        Some(seed) => Conversation::with_seed(&rules, seed),
        None => Conversation::new(&rules),
    };
    session.set_capitalize(config.capitalize);

    println!("{}", greeting(&rules, &mut session));
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush().map_err(|err| format!("failed to write stdout: {err}"))?;
        line.clear();
        let read = stdin.lock().read_line(&mut line).map_err(|err| format!("failed to read stdin: {err}"))?;
        if read == 0 {
            // EOF ends the session as politely as a quit phrase.
            println!("{}", farewell(&rules, &mut session));
            break;
        }
        println!("{}", turn(&rules, &mut session, line.trim()));
        if session.is_quit() {
            break;
        }
    }
    Ok(())
}

fn parse_args() -> Result<CliConfig, String> {
    let mut script_path: Option<String> = None;
    let mut seed: Option<u64> = None;
    let mut capitalize = true;
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                println!("{}", help_text());
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("rogerian {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--no-capitalize" => capitalize = false,
            "--script" | "-s" => {
                let value = args.next().ok_or_else(|| "error: --script expects a path".to_string())?;
                if script_path.is_some() {
                    return Err("error: --script provided multiple times".to_string());
                }
                script_path = Some(value);
            }
            "--seed" => {
                let value = args.next().ok_or_else(|| "error: --seed expects a value".to_string())?;
                seed = Some(parse_seed(&value)?);
            }
            _ if arg.starts_with("--script=") => {
                let value = arg.trim_start_matches("--script=");
                if script_path.is_some() {
                    return Err("error: --script provided multiple times".to_string());
                }
                script_path = Some(value.to_string());
            }
            _ if arg.starts_with("--seed=") => {
                let value = arg.trim_start_matches("--seed=");
                seed = Some(parse_seed(value)?);
            }
            _ => {
                return Err(format!("error: unknown option '{arg}'\n\n{}", help_text()));
            }
        }
    }

    Ok(CliConfig { script_path, seed, capitalize })
}

fn parse_seed(value: &str) -> Result<u64, String> {
    value.parse().map_err(|_| format!("error: invalid --seed '{value}' (expected an unsigned integer)"))
}

fn help_text() -> String {
    format!(
        "rogerian {version}

Rule-driven conversational transformer REPL.

Usage:
  rogerian [OPTIONS]

Reads one utterance per line and prints the reply. The session ends on a
quit phrase (\"bye\", \"quit\", ...) or end of input.

Options:
  -s, --script <path>   Load a JSON rule script instead of the bundled
                        psychotherapist script.
  --seed <n>            Seed the session rng for a reproducible transcript.
  --no-capitalize       Leave reply casing exactly as templated.
  -h, --help            Show this help message.
  -V, --version         Print version information.

Exit codes:
  0  Success.
  1  Script load or compile error.
  2  Invalid arguments.
",
        version = env!("CARGO_PKG_VERSION")
    )
}
