// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Assembler CLI tool
//!
//! Reads EVM assembly from stdin and writes the bytecode to stdout as hex.
//!
//! Usage:
//!     cat program.asm | assembler > program.hex
//!     cat program.asm | assembler --raw > program.bin

use std::{
    io::{self, Read, Write},
    process,
};

use assembler::{assemble, hex};
use clap::Parser;
use log::info;

/// Assemble EVM assembly text into bytecode
#[derive(Parser, Debug)]
#[command(name = "assembler", version)]
struct Args {
    /// Write raw bytes instead of hex text
    #[arg(long)]
    raw: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let mut input = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut input) {
        eprintln!("Error reading stdin: {e}");
        process::exit(1);
    }

    let code = match assemble(&input) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error assembling: {e}");
            process::exit(1);
        }
    };
    info!("assembled {} bytes", code.len());

    let mut stdout = io::stdout().lock();
    let written = if args.raw {
        stdout.write_all(&code)
    } else {
        writeln!(stdout, "{}", hex::encode(&code))
    };
    if let Err(e) = written {
        eprintln!("Error writing stdout: {e}");
        process::exit(1);
    }
}
