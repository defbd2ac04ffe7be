//! Integration tests for the validator
//!
//! These tests exercise the full pipeline on assembly fixtures:
//!
//! 1. Take assembly from `tests/samples/` (or inline with `indoc!`)
//! 2. Assemble it with the `assembler` crate
//! 3. Validate the bytecode
//! 4. Check the verdict and, for valid code, re-walk the recorded depths
//!    independently of the validator
//!
//! The CLI tests run the `validator` binary on files in a temporary directory.

use std::{fs, process::Command};

use cfg::Flow;
use indoc::indoc;
use tempfile::TempDir;
use validator::{
    ErrorKind, FrameId, InstructionInfo, Limits, Validation, ValidationError, Validator, decode,
    effect, validate, validate_batch,
};

const SCENARIO_A_ASM: &str = include_str!("../../../tests/samples/scenario_a_subroutine.asm");
const SCENARIO_B_ASM: &str =
    include_str!("../../../tests/samples/scenario_b_jump_into_push_data.asm");
const SCENARIO_C_ASM: &str = include_str!("../../../tests/samples/scenario_c_depth_mismatch.asm");
const COUNTING_LOOP_ASM: &str = include_str!("../../../tests/samples/counting_loop.asm");
const NESTED_SUBROUTINES_ASM: &str =
    include_str!("../../../tests/samples/nested_subroutines.asm");
const RECURSIVE_SUBROUTINE_ASM: &str =
    include_str!("../../../tests/samples/recursive_subroutine.asm");

fn assemble(source: &str) -> Vec<u8> {
    assembler::assemble(source).expect("fixture should assemble")
}

/// Re-derive every recorded depth from its predecessors.
///
/// Walks the depth record in offset order and checks that each reached
/// instruction's successors were recorded with the depth its stack effect
/// implies. The jump destination is recomputed from the literal of the
/// instruction right before the jump.
fn assert_depths_consistent(code: &[u8], validation: &Validation) {
    let mut previous: Option<(usize, Option<usize>)> = None;

    for (offset, record) in validation.records() {
        let (instruction, next) = decode(code, offset).expect("reached code decodes");
        let effect = effect(&instruction);
        assert!(
            effect.consumed <= record.depth,
            "underflow at {offset:#x} slipped through"
        );
        let after = record.depth - effect.consumed + effect.produced;
        let literal = previous
            .filter(|&(next_offset, _)| next_offset == offset)
            .and_then(|(_, literal)| literal);
        let target_depth = |target: usize| validation.depth_at(target);

        match instruction.opcode().flow {
            Flow::Next | Flow::JumpDest | Flow::BeginSub => {
                if next < code.len() {
                    assert_eq!(target_depth(next), Some(after), "fall-through from {offset:#x}");
                    assert_eq!(validation.frame_at(next), Some(record.frame));
                }
            }
            Flow::Jump => {
                let target = literal.expect("jump has a literal destination");
                assert_eq!(target_depth(target), Some(after), "jump from {offset:#x}");
            }
            Flow::ConditionalJump => {
                let target = literal.expect("jump has a literal destination");
                assert_eq!(target_depth(target), Some(after), "jumpi from {offset:#x}");
                if next < code.len() {
                    assert_eq!(target_depth(next), Some(after), "jumpi fall-through");
                }
            }
            Flow::JumpSub => {
                let entry = literal.expect("call has a literal destination");
                let (callee, _) = decode(code, entry).unwrap();
                let (args, results) = callee.subroutine_arity().unwrap();
                assert_eq!(target_depth(entry), Some(args), "call from {offset:#x}");
                if let Some(resumed) = target_depth(next) {
                    assert_eq!(resumed, after - args + results, "return to {next:#x}");
                }
            }
            Flow::ReturnSub => {
                let FrameId::Subroutine(entry) = record.frame else {
                    panic!("RETURNSUB at {offset:#x} in main code");
                };
                let (callee, _) = decode(code, entry).unwrap();
                let (_, results) = callee.subroutine_arity().unwrap();
                assert_eq!(after, results, "return from {offset:#x}");
            }
            Flow::Terminal => {}
        }

        previous = Some((next, effect.constant.and_then(|literal| literal.to_offset())));
    }
}

// Scenarios

/// A subroutine taking two arguments and leaving one result.
#[test]
fn test_scenario_a_minimal_subroutine_is_valid() {
    let code = assemble(SCENARIO_A_ASM);
    assert_eq!(
        code,
        vec![
            0x60, 0x02, 0x60, 0x03, 0x60, 0x08, 0x5e, 0x00, 0x5c, 0x02, 0x01, 0x01, 0x5d
        ]
    );

    let validation = validate(&code).unwrap();
    assert_eq!(validation.subroutines(), &[8]);
    assert_eq!(validation.depth_at(8), Some(2));
    assert_eq!(validation.depth_at(12), Some(1));
    assert_eq!(validation.depth_at(7), Some(1));
    assert_eq!(validation.frame_at(11), Some(FrameId::Subroutine(8)));
    assert_eq!(validation.max_stack_depth(), Some(3));
    assert_depths_consistent(&code, &validation);
}

/// The `5b` bytes at 4 and 5 are PUSH2 data, not instructions.
#[test]
fn test_scenario_b_jump_into_push_data() {
    let code = assemble(SCENARIO_B_ASM);
    assert_eq!(code, vec![0x60, 0x04, 0x56, 0x61, 0x5b, 0x5b]);

    let error = validate(&code).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidJumpDestination);
    assert_eq!(error.offset(), 2);
    assert_eq!(
        error,
        ValidationError::BadDestination {
            offset: 2,
            target: 4,
            expected: "JUMPDEST"
        }
    );
}

/// The rejoin point is reached with depth 1 through the jump and depth 0
/// through the fall-through.
#[test]
fn test_scenario_c_depth_mismatch_at_rejoin() {
    let code = assemble(SCENARIO_C_ASM);
    assert_eq!(
        code,
        vec![
            0x60, 0x00, 0x60, 0x07, 0x57, 0x5b, 0x00, 0x5b, 0x60, 0x01, 0x60, 0x05, 0x56
        ]
    );

    let error = validate(&code).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::StackDepthMismatch);
    assert_eq!(error.offset(), 5);
}

#[test]
fn test_scenario_d_underflow_at_first_instruction() {
    let error = validate(&[0x01]).unwrap_err();
    assert_eq!(
        error,
        ValidationError::StackUnderflow {
            offset: 0,
            required: 2,
            available: 0
        }
    );
}

#[test]
fn test_scenario_e_stack_limit() {
    let full: Vec<u8> = [0x60, 0x00].repeat(1024);
    let validation = validate(&full).unwrap();
    assert_eq!(validation.max_stack_depth(), Some(1024));

    let over: Vec<u8> = [0x60, 0x00].repeat(1025);
    let error = validate(&over).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::StackOverflow);
    assert_eq!(error.offset(), 2048);
}

// Fixtures

#[test]
fn test_counting_loop_is_valid() {
    let code = assemble(COUNTING_LOOP_ASM);
    let validation = validate(&code).unwrap();
    // `loop:` is at offset 2 and always entered with the counter on the stack
    assert_eq!(validation.depth_at(2), Some(1));
    assert_eq!(validation.max_stack_depth(), Some(3));
    assert_depths_consistent(&code, &validation);
}

#[test]
fn test_nested_subroutines_bound_the_whole_chain() {
    let code = assemble(NESTED_SUBROUTINES_ASM);
    let labels = assembler::ParsedAssembly::parse(NESTED_SUBROUTINES_ASM)
        .labels()
        .unwrap();
    let (outer, inner) = (labels["outer"], labels["inner"]);

    let validation = validate(&code).unwrap();
    assert_eq!(validation.subroutines(), &[outer, inner]);
    assert_eq!(validation.depth_at(outer), Some(1));
    assert_eq!(validation.depth_at(inner), Some(1));
    assert_eq!(validation.max_stack_depth(), Some(3));
    assert_depths_consistent(&code, &validation);

    let tight = Limits {
        max_stack_depth: 2,
        max_code_size: None,
    };
    let error = Validator::with_limits(&code, tight).validate().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::StackOverflow);
}

#[test]
fn test_recursive_subroutine_defers_overflow_to_runtime() {
    let code = assemble(RECURSIVE_SUBROUTINE_ASM);
    let validation = validate(&code).unwrap();
    assert_eq!(validation.max_stack_depth(), None);
    assert_eq!(validation.subroutines().len(), 1);
    assert_depths_consistent(&code, &validation);
}

#[test]
fn test_uncalled_subroutine_is_validated_as_a_root() {
    let code = assemble(indoc! {"
            STOP
        helper:
            BEGINSUB 2 1
            ADD
            RETURNSUB
    "});
    let validation = validate(&code).unwrap();
    assert_eq!(validation.subroutines(), &[1]);
    assert_eq!(validation.depth_at(1), Some(2));
    assert_eq!(validation.frame_at(4), Some(FrameId::Subroutine(1)));
    assert_depths_consistent(&code, &validation);

    let code = assemble(indoc! {"
            STOP
        helper:
            BEGINSUB 1 1
            ADD
            RETURNSUB
    "});
    let error = validate(&code).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::StackUnderflow);
    assert_eq!(error.offset(), 4);
}

#[test]
fn test_subroutine_sharing_code_with_main_is_rejected() {
    let code = assemble(indoc! {"
            PUSH1 @shared
            JUMP
        sub:
            BEGINSUB 0 0
            PUSH1 @shared
            JUMP
        shared:
            JUMPDEST
            STOP
    "});
    let error = validate(&code).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidJumpDestination);
}

#[test]
fn test_jump_destination_must_be_pushed_right_before_the_jump() {
    let code = assemble(indoc! {"
            PUSH1 @target
            DUP1
            JUMP
        target:
            JUMPDEST
            STOP
    "});
    let error = validate(&code).unwrap_err();
    assert_eq!(error, ValidationError::NonConstantDestination { offset: 3 });
}

#[test]
fn test_wide_push_destination() {
    let code = assemble(indoc! {"
            PUSH32 @target
            JUMP
        target:
            JUMPDEST
            STOP
    "});
    let validation = validate(&code).unwrap();
    assert_eq!(validation.depth_at(34), Some(0));
}

/// Main holds 1000 items and calls `deep`, which adds 100 more. The chain
/// overflows whether or not main also calls the recursive `countdown`.
fn deep_chain_source(with_recursion: bool) -> String {
    let recursion = if with_recursion {
        "PUSH2 @countdown\nJUMPSUB\n"
    } else {
        ""
    };
    format!(
        "{pushes}PUSH2 @deep\nJUMPSUB\n{recursion}STOP\n\
         deep: BEGINSUB 0 0\n{pushes_sub}{pops}RETURNSUB\n\
         countdown: BEGINSUB 0 0\nPUSH0\nPUSH2 @done\nJUMPI\n\
         PUSH2 @countdown\nJUMPSUB\ndone: JUMPDEST\nRETURNSUB\n",
        pushes = "PUSH0\n".repeat(1000),
        pushes_sub = "PUSH0\n".repeat(100),
        pops = "POP\n".repeat(100),
    )
}

#[test]
fn test_deep_chain_overflows_beside_recursion() {
    for with_recursion in [false, true] {
        let code = assemble(&deep_chain_source(with_recursion));
        let error = validate(&code).unwrap_err();
        assert_eq!(
            error,
            ValidationError::StackOverflow {
                offset: 1003,
                depth: 1100,
                limit: 1024
            },
            "with_recursion={with_recursion}"
        );
    }

    // With room for the chain, the recursive call still defers the bound
    let limits = Limits {
        max_stack_depth: 1100,
        max_code_size: None,
    };
    let code = assemble(&deep_chain_source(true));
    let validation = Validator::with_limits(&code, limits).validate().unwrap();
    assert_eq!(validation.max_stack_depth(), None);
    assert_depths_consistent(&code, &validation);
}

// Properties

#[test]
fn test_validation_is_deterministic() {
    for source in [
        SCENARIO_A_ASM,
        COUNTING_LOOP_ASM,
        NESTED_SUBROUTINES_ASM,
        RECURSIVE_SUBROUTINE_ASM,
    ] {
        let code = assemble(source);
        let first = validate(&code).unwrap();
        let second = validate(&code).unwrap();
        assert_eq!(
            first.records().collect::<Vec<_>>(),
            second.records().collect::<Vec<_>>()
        );
        assert_eq!(first.steps(), second.steps());
        assert_eq!(first.max_stack_depth(), second.max_stack_depth());
    }

    for source in [SCENARIO_B_ASM, SCENARIO_C_ASM] {
        let code = assemble(source);
        assert_eq!(validate(&code).unwrap_err(), validate(&code).unwrap_err());
    }
}

/// `n` back-to-back diamonds: each JUMPI skips a balanced PUSH/POP pair.
fn diamonds(n: usize) -> String {
    let mut source = String::new();
    for i in 0..n {
        source.push_str(&format!(
            "PUSH0\nPUSH2 @join{i}\nJUMPI\nPUSH1 1\nPOP\njoin{i}: JUMPDEST\n"
        ));
    }
    source.push_str("STOP\n");
    source
}

#[test]
fn test_work_grows_linearly_with_code_size() {
    let mut previous_steps = 0;
    for n in [16, 32, 64, 128] {
        let code = assemble(&diamonds(n));
        let validation = validate(&code).unwrap();
        let instruction_count = 6 * n + 1;

        // Every instruction is stepped once plus one cut-off revisit per join
        assert!(
            validation.steps() <= 2 * instruction_count,
            "{} steps for {instruction_count} instructions",
            validation.steps()
        );
        if previous_steps > 0 {
            assert!(validation.steps() <= 2 * previous_steps + 4);
        }
        previous_steps = validation.steps();
        assert_depths_consistent(&code, &validation);
    }
}

#[test]
fn test_batch_matches_sequential_validation() {
    let units: Vec<Vec<u8>> = [
        SCENARIO_A_ASM,
        SCENARIO_B_ASM,
        SCENARIO_C_ASM,
        COUNTING_LOOP_ASM,
        NESTED_SUBROUTINES_ASM,
        RECURSIVE_SUBROUTINE_ASM,
    ]
    .iter()
    .map(|source| assemble(source))
    .collect();
    let slices: Vec<&[u8]> = units.iter().map(Vec::as_slice).collect();

    let batch = validate_batch(&slices, Limits::default());
    assert_eq!(batch.len(), units.len());
    for (code, result) in units.iter().zip(&batch) {
        match (validate(code), result) {
            (Ok(expected), Ok(actual)) => {
                assert_eq!(expected.max_stack_depth(), actual.max_stack_depth());
            }
            (Err(expected), Err(actual)) => assert_eq!(&expected, actual),
            (expected, actual) => panic!("batch disagrees: {expected:?} vs {actual:?}"),
        }
    }
}

// CLI

fn run_cli(args: &[&str]) -> (i32, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_validator"))
        .args(args)
        .output()
        .expect("failed to run validator");
    (
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stdout).into_owned(),
    )
}

#[test]
fn test_cli_reports_valid_assembly() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("scenario_a.asm");
    fs::write(&path, SCENARIO_A_ASM).unwrap();

    let (status, stdout) = run_cli(&["--asm", "--depths", path.to_str().unwrap()]);
    assert_eq!(status, 0, "{stdout}");
    assert!(stdout.contains("valid (max stack depth 3)"), "{stdout}");
    assert!(stdout.contains("subroutines: 0x8"), "{stdout}");
    assert!(stdout.contains("subroutine@0x8"), "{stdout}");
}

#[test]
fn test_cli_reports_invalid_hex() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("scenario_b.hex");
    fs::write(&path, "0x600456615b5b\n").unwrap();

    let (status, stdout) = run_cli(&["--hex", "--disassemble", path.to_str().unwrap()]);
    assert_eq!(status, 1, "{stdout}");
    assert!(stdout.contains("PUSH2 0x5b5b"), "{stdout}");
    assert!(
        stdout.contains("invalid: invalid jump destination at 0x2"),
        "{stdout}"
    );
}

#[test]
fn test_cli_reads_raw_bytes_and_applies_limits() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("pushes.bin");
    fs::write(&path, [0x5f, 0x5f, 0x5f, 0x00]).unwrap();

    let (status, _) = run_cli(&[path.to_str().unwrap()]);
    assert_eq!(status, 0);

    let (status, stdout) = run_cli(&["--max-stack", "2", path.to_str().unwrap()]);
    assert_eq!(status, 1);
    assert!(stdout.contains("stack overflow at 0x2"), "{stdout}");

    let (status, stdout) = run_cli(&["--max-code-size", "3", path.to_str().unwrap()]);
    assert_eq!(status, 1);
    assert!(stdout.contains("code too large"), "{stdout}");
}

#[test]
fn test_cli_input_errors_exit_with_two() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("missing.bin");
    let (status, _) = run_cli(&[missing.to_str().unwrap()]);
    assert_eq!(status, 2);

    let bad_hex = temp_dir.path().join("bad.hex");
    fs::write(&bad_hex, "60zz").unwrap();
    let (status, _) = run_cli(&["--hex", bad_hex.to_str().unwrap()]);
    assert_eq!(status, 2);
}
