//! CLI for the validator
//!
//! Validates one code unit and reports the result.
//!
//! # Usage
//!
//! ```bash
//! # Raw bytecode
//! validator contract.bin
//!
//! # Hex text, with the per-instruction depth table
//! validator --hex contract.hex --depths
//!
//! # Assembly source, with a disassembly listing
//! validator --asm program.asm --disassemble
//! ```
//!
//! Exit status: 0 when valid, 1 when invalid, 2 when the input cannot be read.

use std::{fs, path::PathBuf, process};

use clap::Parser;
use log::info;
use validator::{Limits, MAX_STACK_DEPTH, Validation, ValidationError, Validator, instructions};

/// Statically validate control flow and stack safety of EVM bytecode
#[derive(Parser, Debug)]
#[command(name = "validator", version)]
struct Args {
    /// Code unit to validate
    input: PathBuf,

    /// Input is hex text
    #[arg(long, conflicts_with = "asm")]
    hex: bool,

    /// Input is assembly source
    #[arg(long)]
    asm: bool,

    /// Maximum stack depth
    #[arg(long, default_value_t = MAX_STACK_DEPTH)]
    max_stack: usize,

    /// Reject code longer than this many bytes
    #[arg(long)]
    max_code_size: Option<usize>,

    /// Print the recorded stack depth of every reached instruction
    #[arg(long)]
    depths: bool,

    /// Print a disassembly listing
    #[arg(long)]
    disassemble: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let code = read_code(&args).unwrap_or_else(|e| {
        eprintln!("Failed to read {}: {e}", args.input.display());
        process::exit(2);
    });
    info!("read {} bytes from {}", code.len(), args.input.display());

    if args.disassemble {
        print_disassembly(&code);
    }

    let limits = Limits {
        max_stack_depth: args.max_stack,
        max_code_size: args.max_code_size,
    };
    match Validator::with_limits(&code, limits).validate() {
        Ok(validation) => {
            report_valid(&validation);
            if args.depths {
                print_depths(&validation);
            }
        }
        Err(error) => {
            report_invalid(&error);
            process::exit(1);
        }
    }
}

fn read_code(args: &Args) -> Result<Vec<u8>, String> {
    if args.hex {
        let text = fs::read_to_string(&args.input).map_err(|e| e.to_string())?;
        assembler::hex::decode(&text).map_err(|e| e.to_string())
    } else if args.asm {
        let text = fs::read_to_string(&args.input).map_err(|e| e.to_string())?;
        assembler::assemble(&text).map_err(|e| e.to_string())
    } else {
        fs::read(&args.input).map_err(|e| e.to_string())
    }
}

fn report_valid(validation: &Validation) {
    match validation.max_stack_depth() {
        Some(depth) => println!("valid (max stack depth {depth})"),
        None => println!("valid (stack bound deferred to runtime: recursive subroutines)"),
    }
    if !validation.subroutines().is_empty() {
        let entries: Vec<String> = validation
            .subroutines()
            .iter()
            .map(|entry| format!("{entry:#x}"))
            .collect();
        println!("subroutines: {}", entries.join(", "));
    }
}

fn report_invalid(error: &ValidationError) {
    println!("invalid: {} at {:#x}", error.kind(), error.offset());
    println!("  {error}");
}

fn print_depths(validation: &Validation) {
    println!("\n offset  depth  frame");
    for (offset, record) in validation.records() {
        println!("  {offset:04x}  {:>5}  {}", record.depth, record.frame);
    }
}

fn print_disassembly(code: &[u8]) {
    for item in instructions(code) {
        match item {
            Ok(instruction) => println!("  {:04x}: {instruction}", instruction.offset),
            Err(error) => println!("  {:04x}: <{error}>", error.offset()),
        }
    }
    println!();
}
