use serde_json::Value;
use std::env;
use std::io::Read;

use crate::alert::cmd_alert_show;
use crate::config::{
    APP_DESC, APP_NAME, APP_VERSION, AppConfig, DEFAULT_LOG_TAIL, DEFAULT_QUARANTINE_LIST,
};
use crate::error::{
    CxError, EXIT_CAPTURE, EXIT_OK, EXIT_RUNTIME, EXIT_USAGE, format_error, print_runtime_error,
    print_usage_error,
};
use crate::execution::{FailureKind, Harness, StructuredFailure};
use crate::logs::cmd_logs;
use crate::logview::{cmd_budget, cmd_log_tail};
use crate::paths::LogLayout;
use crate::provider_adapter::resolve_provider_adapter;
use crate::quarantine::{cmd_quarantine_list, cmd_quarantine_show};
use crate::runtime_controls::{cmd_core, cmd_reducer_status};
use crate::schema::{SchemaContract, load_registered_schema, next_commands_contract};

const DEFAULT_STRUCTURED_INSTRUCTION: &str =
    "Analyze the terminal output below and answer with the requested JSON object.";

fn print_help() {
    println!("{APP_NAME} - {APP_DESC}");
    println!();
    println!("Usage:");
    println!("  {APP_NAME} <command> [args]");
    println!();
    println!("Commands:");
    println!("  run <cmd...>       Run a command and send its budgeted output to the LLM");
    println!("  next <cmd...>      Suggest next shell commands from command output (strict JSON)");
    println!(
        "  structured <tool> [--keys a,b] [--schema NAME] [--schema-text TEXT] [--instruction TEXT] [-- <cmd...>]"
    );
    println!("                     Schema-validated call over stdin or a wrapped command");
    println!("  replay <id>        Replay a quarantined structured call in strict mode");
    println!(
        "  quarantine list [N]  Show recent quarantine entries (default {DEFAULT_QUARANTINE_LIST})"
    );
    println!("  quarantine show <id> Show a quarantined entry payload");
    println!("  budget             Show context budget settings and last clip fields");
    println!("  log-tail [N]       Pretty-print last N log entries (default {DEFAULT_LOG_TAIL})");
    println!("  logs validate      Validate the run log contract");
    println!("  logs stats [N]     Duration and token means over the last N runs");
    println!("  alert-show         Show active alert thresholds");
    println!("  reducer-status     Show reducer version/range decision and fallback mode");
    println!("  core               Show the resolved pipeline configuration");
    println!("  version            Print tool version");
    println!("  help               Print this help");
}

fn parse_n(args: &[String], idx: usize, default: usize) -> usize {
    args.get(idx)
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

fn failure_exit(cmd: &str, failure: &StructuredFailure) -> i32 {
    crate::cx_eprintln!("{}", format_error(cmd, &failure.to_string()));
    match failure.kind {
        FailureKind::Capture => EXIT_CAPTURE,
        FailureKind::Backend | FailureKind::Validation | FailureKind::NotFound => EXIT_RUNTIME,
    }
}

fn print_json(cmd: &str, value: &Value) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(s) => {
            println!("{s}");
            EXIT_OK
        }
        Err(e) => print_runtime_error(cmd, &format!("render failure: {e}")),
    }
}

fn commands_from_value(value: &Value) -> Result<Vec<String>, String> {
    let arr = value
        .get("commands")
        .and_then(Value::as_array)
        .ok_or_else(|| "'commands' is not an array".to_string())?;
    let mut out: Vec<String> = Vec::new();
    for item in arr {
        let Some(s) = item.as_str() else {
            return Err("commands array must contain strings".to_string());
        };
        if !s.trim().is_empty() {
            out.push(s.to_string());
        }
    }
    Ok(out)
}

fn cmd_run(harness: &mut Harness<'_>, command: &[String]) -> i32 {
    match harness.invoke(command) {
        Ok(out) => {
            println!("{}", out.text);
            out.status
        }
        Err(e @ CxError::Capture { .. }) => {
            crate::cx_eprintln!("{}", format_error("run", &e.to_string()));
            EXIT_CAPTURE
        }
        Err(e) => print_runtime_error("run", &e.to_string()),
    }
}

fn cmd_next(harness: &mut Harness<'_>, command: &[String]) -> i32 {
    let instruction = format!(
        "Based on the terminal command output below, propose the NEXT shell commands to run.\nReturn 1-6 commands in execution order.\n\nExecuted command:\n{}\n\nTERMINAL OUTPUT:",
        shell_words::join(command)
    );
    let contract = next_commands_contract();
    let value = match harness.invoke_structured_command("next", &contract, &instruction, command) {
        Ok(v) => v,
        Err(f) => return failure_exit("next", &f),
    };
    match commands_from_value(&value) {
        Ok(commands) => {
            for cmd in commands {
                println!("{cmd}");
            }
            EXIT_OK
        }
        Err(reason) => print_runtime_error("next", &reason),
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct StructuredArgs {
    tool: String,
    keys: Vec<String>,
    schema_name: Option<String>,
    schema_text: Option<String>,
    instruction: Option<String>,
    command: Vec<String>,
}

fn parse_structured_args(args: &[String]) -> Result<StructuredArgs, String> {
    let mut it = args.iter();
    let Some(tool) = it.next().filter(|t| !t.starts_with('-')) else {
        return Err("missing tool name".to_string());
    };
    let mut out = StructuredArgs {
        tool: tool.clone(),
        ..StructuredArgs::default()
    };
    while let Some(flag) = it.next() {
        if flag == "--" {
            out.command = it.by_ref().cloned().collect();
            if out.command.is_empty() {
                return Err("'--' must be followed by a command".to_string());
            }
            break;
        }
        let Some(value) = it.next() else {
            return Err(format!("{flag} requires a value"));
        };
        match flag.as_str() {
            "--keys" => {
                out.keys = value
                    .split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(ToOwned::to_owned)
                    .collect();
            }
            "--schema" => out.schema_name = Some(value.clone()),
            "--schema-text" => out.schema_text = Some(value.clone()),
            "--instruction" => out.instruction = Some(value.clone()),
            other => return Err(format!("unknown flag '{other}'")),
        }
    }
    if out.keys.is_empty() && out.schema_name.is_none() {
        return Err("either --keys or --schema is required".to_string());
    }
    Ok(out)
}

fn placeholder_description(keys: &[String]) -> String {
    let obj: serde_json::Map<String, Value> = keys
        .iter()
        .map(|k| (k.clone(), Value::String("...".to_string())))
        .collect();
    serde_json::to_string_pretty(&Value::Object(obj)).unwrap_or_default()
}

fn resolve_contract(
    harness: &Harness<'_>,
    args: &StructuredArgs,
) -> Result<SchemaContract, String> {
    let mut contract = match &args.schema_name {
        Some(name) => load_registered_schema(&harness.layout().schema_dir(), name)
            .map_err(|e| e.to_string())?,
        None => SchemaContract::new(placeholder_description(&args.keys), &args.keys),
    };
    if !args.keys.is_empty() && args.schema_name.is_some() {
        contract = SchemaContract::new(contract.description, &args.keys);
    }
    if let Some(text) = &args.schema_text {
        contract.description = text.clone();
    }
    Ok(contract)
}

fn cmd_structured(harness: &mut Harness<'_>, args: &[String]) -> i32 {
    let usage = format!(
        "{APP_NAME} structured <tool> [--keys a,b] [--schema NAME] [--schema-text TEXT] [--instruction TEXT] [-- <cmd...>]"
    );
    let parsed = match parse_structured_args(args) {
        Ok(v) => v,
        Err(e) => {
            crate::cx_eprintln!("{}", format_error("structured", &e));
            return print_usage_error("structured", &usage);
        }
    };
    let contract = match resolve_contract(harness, &parsed) {
        Ok(v) => v,
        Err(e) => return print_runtime_error("structured", &e),
    };
    let result = if parsed.command.is_empty() {
        let mut input = String::new();
        if let Err(e) = std::io::stdin().read_to_string(&mut input) {
            return print_runtime_error("structured", &format!("failed to read stdin: {e}"));
        }
        harness.invoke_structured(&parsed.tool, &contract, &input)
    } else {
        let instruction = parsed
            .instruction
            .as_deref()
            .unwrap_or(DEFAULT_STRUCTURED_INSTRUCTION);
        harness.invoke_structured_command(&parsed.tool, &contract, instruction, &parsed.command)
    };
    match result {
        Ok(v) => print_json("structured", &v),
        Err(f) => failure_exit("structured", &f),
    }
}

fn cmd_replay(harness: &mut Harness<'_>, id: &str) -> i32 {
    match harness.replay(id) {
        Ok(v) => print_json("replay", &v),
        Err(f) => failure_exit("replay", &f),
    }
}

fn handle_quarantine(harness: &Harness<'_>, args: &[String]) -> i32 {
    match args.get(2).map(String::as_str).unwrap_or("list") {
        "list" => cmd_quarantine_list(
            harness.quarantine(),
            parse_n(args, 3, DEFAULT_QUARANTINE_LIST),
        ),
        "show" => match args.get(3) {
            Some(id) => cmd_quarantine_show(harness.quarantine(), id),
            None => print_usage_error("quarantine", &format!("{APP_NAME} quarantine show <id>")),
        },
        other => {
            crate::cx_eprintln!("{APP_NAME}: unknown quarantine subcommand '{other}'");
            crate::cx_eprintln!("Usage: {APP_NAME} quarantine <list [N]|show <id>>");
            EXIT_USAGE
        }
    }
}

fn require_command(args: &[String], cmd: &str) -> Result<(), i32> {
    if args.len() < 3 {
        return Err(print_usage_error(cmd, &format!("{APP_NAME} {cmd} <command> [args...]")));
    }
    Ok(())
}

fn dispatch(cfg: &AppConfig, layout: LogLayout, args: &[String]) -> i32 {
    let cmd = args.get(1).map(String::as_str).unwrap_or("help");
    let mut harness = Harness::new(cfg, resolve_provider_adapter(&cfg.backend), layout);
    match cmd {
        "run" => match require_command(args, "run") {
            Ok(()) => cmd_run(&mut harness, &args[2..]),
            Err(code) => code,
        },
        "next" => match require_command(args, "next") {
            Ok(()) => cmd_next(&mut harness, &args[2..]),
            Err(code) => code,
        },
        "structured" => cmd_structured(&mut harness, &args[2..]),
        "replay" => match args.get(2) {
            Some(id) => cmd_replay(&mut harness, id),
            None => print_usage_error("replay", &format!("{APP_NAME} replay <quarantine_id>")),
        },
        "quarantine" => handle_quarantine(&harness, args),
        "budget" => cmd_budget(&harness.ambient().budget, harness.layout()),
        "log-tail" => cmd_log_tail(harness.layout(), parse_n(args, 2, DEFAULT_LOG_TAIL)),
        "logs" => cmd_logs(APP_NAME, harness.layout(), &args[2..]),
        "alert-show" => cmd_alert_show(&cfg.alerts),
        "reducer-status" => cmd_reducer_status(&mut harness),
        "core" => cmd_core(cfg, &harness),
        other => {
            crate::cx_eprintln!("{APP_NAME}: unknown command '{other}'");
            crate::cx_eprintln!("Run '{APP_NAME} help' for usage.");
            EXIT_USAGE
        }
    }
}

pub fn run() -> i32 {
    let args: Vec<String> = env::args().collect();
    match args.get(1).map(String::as_str).unwrap_or("help") {
        "help" | "-h" | "--help" => {
            print_help();
            return EXIT_OK;
        }
        "version" | "-V" | "--version" => {
            println!("{APP_NAME} {APP_VERSION}");
            return EXIT_OK;
        }
        _ => {}
    }
    let cfg = AppConfig::load();
    let layout = match LogLayout::from_process() {
        Ok(v) => v,
        Err(e) => return print_runtime_error("", &e.to_string()),
    };
    dispatch(&cfg, layout, &args)
}
