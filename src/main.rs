//! sosim binary: run the simulated machine on a directory of `.maq` guest
//! programs.
//!
//! Usage: `sosim [program-dir] [base|round-robin|priority]`
//!
//! The program directory (default `demos/`) must contain `trata_int.maq`
//! (the interrupt-handler stub) and `init.maq`. Each terminal keyboard is
//! seeded with a few words of input so read-heavy guests have something to
//! chew on; screen transcripts are printed when the machine stops. Logging
//! goes through `env_logger` (`RUST_LOG=info` shows the kernel narrating).

use std::env;
use std::process::ExitCode;

use log::error;

use sosim::bus::TERMINAL_GROUPS;
use sosim::{FileLoader, KernelConfig, Machine, RunOutcome, SchedPolicy};

/// Upper bound on machine ticks; generous for any of the shipped demos.
const RUN_BUDGET: u64 = 5_000_000;

fn main() -> ExitCode {
    env_logger::init();

    let mut args = env::args().skip(1);
    let dir = args.next().unwrap_or_else(|| "demos".to_string());
    let policy = match args.next() {
        Some(arg) => match SchedPolicy::from_arg(&arg) {
            Some(policy) => policy,
            None => {
                eprintln!("unknown scheduler '{arg}' (expected base | round-robin | priority)");
                return ExitCode::FAILURE;
            }
        },
        None => KernelConfig::default().policy,
    };

    let config = KernelConfig {
        policy,
        ..KernelConfig::default()
    };
    let mut machine = Machine::new(Box::new(FileLoader::new(dir)), config);

    {
        let mut io = machine.io().borrow_mut();
        for group in 0..TERMINAL_GROUPS {
            io.terminal_mut(group)
                .push_input_all([group as i32 + 1, 10, 20]);
        }
    }

    let outcome = match machine.run(RUN_BUDGET) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("machine stopped on an unrecoverable fault: {e}");
            return ExitCode::FAILURE;
        }
    };

    for group in 0..TERMINAL_GROUPS {
        let io = machine.io().borrow();
        let output = io.terminal(group).output();
        if !output.is_empty() {
            println!("terminal {group}: {}", render(output));
        }
    }

    match outcome {
        RunOutcome::Finished if !machine.kernel().fatal() => ExitCode::SUCCESS,
        RunOutcome::Finished | RunOutcome::KernelFailed => {
            error!("kernel stopped on an internal error");
            ExitCode::FAILURE
        }
        RunOutcome::BudgetExhausted => {
            error!("guest programs did not finish within {RUN_BUDGET} ticks");
            ExitCode::FAILURE
        }
    }
}

/// Render a screen transcript: printable bytes as text, anything else as a
/// bracketed number.
fn render(words: &[i32]) -> String {
    let mut out = String::new();
    for &w in words {
        match u8::try_from(w) {
            Ok(b) if (0x20..0x7f).contains(&b) => out.push(b as char),
            _ => out.push_str(&format!("[{w}]")),
        }
    }
    out
}
