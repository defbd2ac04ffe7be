//! Control-flow and stack validation of EVM bytecode
//!
//! Provides [`Validator`], a symbolic executor that walks every reachable
//! control-flow edge once while tracking the stack depth relative to the
//! current frame's base. Revisits are cut off by the per-offset depth record,
//! so loops terminate and the walk stays linear in the code size.

use std::collections::{BTreeMap, HashMap, HashSet};

use cfg::{CallGraph, CallSite, ClassifiedOpcode, Flow, FrameId, InstructionInfo, StackBound};
use log::{debug, trace};

use crate::{
    decode::{InstructionBoundaries, Literal, decode},
    error::ValidationError,
    stack::{DepthRecord, Limits, StackDepths, StackEffect, Visit},
};

/// How a work item was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    /// Root of a top-level walk
    Entry,
    /// Sequential successor
    FallThrough,
    /// `JUMP` destination
    Jump,
    /// `JUMPI` destination
    JumpTaken,
    /// `JUMPI` successor when the condition is false
    JumpNotTaken,
    /// `JUMPSUB` destination
    SubroutineCall,
    /// Instruction after a `JUMPSUB`, once the callee has returned
    SubroutineReturn,
}

/// The frame a work item executes in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Frame {
    id: FrameId,
    /// Absolute stack pointer at which this frame's items start
    base: usize,
    /// Items the frame must leave at `RETURNSUB`
    results: usize,
}

impl Frame {
    const MAIN: Frame = Frame {
        id: FrameId::Main,
        base: 0,
        results: 0,
    };
}

#[derive(Debug, Clone, Copy)]
struct WorkItem<'a> {
    pc: usize,
    /// Absolute stack pointer on entry to `pc`
    sp: usize,
    frame: Frame,
    edge: Edge,
    /// Instruction that transferred control here
    origin: usize,
    /// Literal pushed by the immediately preceding instruction on this path
    constant: Option<Literal<'a>>,
}

/// Caller state to resume once a subroutine returns
#[derive(Debug, Clone, Copy)]
struct Continuation {
    pc: usize,
    sp: usize,
    frame: Frame,
    origin: usize,
}

impl Continuation {
    fn resume<'a>(self) -> WorkItem<'a> {
        WorkItem {
            pc: self.pc,
            sp: self.sp,
            frame: self.frame,
            edge: Edge::SubroutineReturn,
            origin: self.origin,
            constant: None,
        }
    }
}

/// Result of a successful validation
#[derive(Debug, Clone)]
pub struct Validation {
    depths: StackDepths,
    subroutines: Vec<usize>,
    steps: usize,
    max_stack_depth: Option<usize>,
}

impl Validation {
    /// Depth relative to the owning frame's base on entry to the instruction
    /// at `offset`, or None if it is unreachable or not an instruction start.
    pub fn depth_at(&self, offset: usize) -> Option<usize> {
        self.depths.get(offset).map(|record| record.depth)
    }

    /// Frame that owns the instruction at `offset`
    pub fn frame_at(&self, offset: usize) -> Option<FrameId> {
        self.depths.get(offset).map(|record| record.frame)
    }

    /// Every reached instruction with its depth record, by ascending offset
    pub fn records(&self) -> impl Iterator<Item = (usize, DepthRecord)> + '_ {
        self.depths.iter()
    }

    /// Offsets of every `BEGINSUB` validated as a subroutine entry
    pub fn subroutines(&self) -> &[usize] {
        &self.subroutines
    }

    /// Number of work steps taken, including revisits cut off by the depth record
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Worst-case stack depth of the main code including the subroutines it
    /// calls, or None when a recursive call chain defers the bound to runtime.
    pub fn max_stack_depth(&self) -> Option<usize> {
        self.max_stack_depth
    }
}

/// Validator for a single code unit
///
/// Holds no state between runs: every call to [`validate`](Self::validate)
/// starts from an empty depth record.
pub struct Validator<'a> {
    code: &'a [u8],
    limits: Limits,
}

impl<'a> Validator<'a> {
    /// Create a validator with the default limits
    pub fn new(code: &'a [u8]) -> Self {
        Self::with_limits(code, Limits::default())
    }

    /// Create a validator with custom limits
    pub fn with_limits(code: &'a [u8], limits: Limits) -> Self {
        Self { code, limits }
    }

    /// Validate the main code from offset 0, then every subroutine the main
    /// code never calls.
    ///
    /// Uncalled subroutines are walked as roots with their declared arguments
    /// on an otherwise empty stack. All walks share one depth record, so an
    /// entry already validated through a call is not walked again.
    pub fn validate(&self) -> Result<Validation, ValidationError> {
        if let Some(limit) = self.limits.max_code_size {
            if self.code.len() > limit {
                return Err(ValidationError::CodeTooLarge {
                    size: self.code.len(),
                    limit,
                });
            }
        }

        let mut walk = Walk::new(self.code, self.limits);
        walk.run(WorkItem {
            pc: 0,
            sp: 0,
            frame: Frame::MAIN,
            edge: Edge::Entry,
            origin: 0,
            constant: None,
        })?;

        let entries: Vec<usize> = walk.boundaries.subroutine_entries(self.code).collect();
        for entry in entries {
            if walk.depths.get(entry).is_some() {
                continue;
            }
            let (args, results) = walk.arity(entry)?;
            debug!("validating uncalled subroutine at {entry:#x}");
            walk.enter(FrameId::Subroutine(entry), args);
            walk.run(WorkItem {
                pc: entry,
                sp: args,
                frame: Frame {
                    id: FrameId::Subroutine(entry),
                    base: 0,
                    results,
                },
                edge: Edge::Entry,
                origin: entry,
                constant: None,
            })?;
        }

        walk.finish()
    }
}

/// State of one validation run
struct Walk<'a> {
    code: &'a [u8],
    limits: Limits,
    boundaries: InstructionBoundaries,
    depths: StackDepths,
    pending: Vec<WorkItem<'a>>,
    /// Callers waiting for a subroutine's first clean return, by entry offset
    waiting: HashMap<usize, Vec<Continuation>>,
    /// Subroutines known to return
    returning: HashSet<usize>,
    /// Peak relative depth of each frame
    peaks: BTreeMap<FrameId, usize>,
    calls: Vec<CallSite>,
    steps: usize,
}

impl<'a> Walk<'a> {
    fn new(code: &'a [u8], limits: Limits) -> Self {
        let mut peaks = BTreeMap::new();
        peaks.insert(FrameId::Main, 0);
        Self {
            code,
            limits,
            boundaries: InstructionBoundaries::scan(code),
            depths: StackDepths::new(code.len()),
            pending: Vec::new(),
            waiting: HashMap::new(),
            returning: HashSet::new(),
            peaks,
            calls: Vec::new(),
            steps: 0,
        }
    }

    /// Drain the worklist starting from `root`.
    ///
    /// Each popped item is followed along its sequential path without going
    /// back through the worklist; only secondary successors are pushed.
    fn run(&mut self, root: WorkItem<'a>) -> Result<(), ValidationError> {
        self.pending.push(root);
        while let Some(item) = self.pending.pop() {
            let mut current = Some(item);
            while let Some(item) = current {
                current = self.step(item)?;
            }
        }
        Ok(())
    }

    /// Process one instruction and return the successor to continue with.
    fn step(&mut self, item: WorkItem<'a>) -> Result<Option<WorkItem<'a>>, ValidationError> {
        self.steps += 1;

        let pc = item.pc;
        if pc >= self.code.len() {
            // Running off the end is an implicit STOP
            return Ok(None);
        }

        let (instruction, next) = decode(self.code, pc)?;
        let frame = item.frame;
        let depth = item.sp - frame.base;

        trace!(
            "{pc:#06x} {instruction} depth={depth} frame={} edge={:?}",
            frame.id, item.edge
        );

        if instruction.opcode().flow == Flow::BeginSub && frame.id != FrameId::Subroutine(pc) {
            return Err(ValidationError::UncalledSubroutineEntry { offset: pc });
        }

        let record = DepthRecord {
            depth,
            frame: frame.id,
        };
        match self.depths.record(pc, record) {
            Visit::First => {}
            Visit::Revisit => return Ok(None),
            Visit::Conflict(recorded) if recorded.frame != frame.id => {
                return Err(ValidationError::CrossFrameTransfer {
                    offset: item.origin,
                    target: pc,
                });
            }
            Visit::Conflict(recorded) => {
                return Err(ValidationError::StackDepthMismatch {
                    offset: pc,
                    recorded: recorded.depth,
                    found: depth,
                });
            }
        }

        let effect = StackEffect::from(&instruction);
        if effect.consumed > depth {
            return Err(ValidationError::StackUnderflow {
                offset: pc,
                required: effect.consumed,
                available: depth,
            });
        }
        let sp = item.sp - effect.consumed + effect.produced;
        let after = sp - frame.base;
        if after > self.limits.max_stack_depth {
            return Err(ValidationError::StackOverflow {
                offset: pc,
                depth: after,
                limit: self.limits.max_stack_depth,
            });
        }
        let peak = self.peaks.entry(frame.id).or_insert(0);
        *peak = (*peak).max(depth).max(after);

        let successor = WorkItem {
            pc: next,
            sp,
            frame,
            edge: Edge::FallThrough,
            origin: pc,
            constant: effect.constant,
        };

        if instruction.is_terminal() {
            return Ok(None);
        }
        if instruction.is_call() {
            self.call(&item, next, sp)?;
            return Ok(None);
        }
        if instruction.is_return() {
            self.ret(frame, pc, depth)?;
            return Ok(None);
        }
        if instruction.is_jump() {
            let target = self.destination(&item, Flow::JumpDest)?;
            let edge = if instruction.falls_through() {
                self.pending.push(WorkItem {
                    edge: Edge::JumpNotTaken,
                    ..successor
                });
                Edge::JumpTaken
            } else {
                Edge::Jump
            };
            return Ok(Some(WorkItem {
                pc: target,
                edge,
                constant: None,
                ..successor
            }));
        }
        Ok(Some(successor))
    }

    /// Resolve the destination of the jump or call at `item.pc`.
    ///
    /// The destination must be the literal pushed right before the jump and
    /// must address an instruction boundary holding `marker`.
    fn destination(&self, item: &WorkItem<'a>, marker: Flow) -> Result<usize, ValidationError> {
        let offset = item.pc;
        let literal = item
            .constant
            .ok_or(ValidationError::NonConstantDestination { offset })?;
        let target = literal
            .to_offset()
            .filter(|&target| target < self.code.len())
            .ok_or(ValidationError::DestinationOutOfBounds {
                offset,
                len: self.code.len(),
            })?;

        let is_marker = self.boundaries.contains(target)
            && ClassifiedOpcode::from_byte(self.code[target])
                .is_some_and(|opcode| opcode.flow == marker);
        if !is_marker {
            return Err(ValidationError::BadDestination {
                offset,
                target,
                expected: if marker == Flow::BeginSub {
                    "BEGINSUB"
                } else {
                    "JUMPDEST"
                },
            });
        }
        Ok(target)
    }

    /// `(args, results)` declared by the `BEGINSUB` at `entry`
    fn arity(&self, entry: usize) -> Result<(usize, usize), ValidationError> {
        let (instruction, _) = decode(self.code, entry)?;
        Ok(instruction.subroutine_arity().unwrap_or((0, 0)))
    }

    /// Note that `frame` was entered with `args` items on its stack
    fn enter(&mut self, frame: FrameId, args: usize) {
        let peak = self.peaks.entry(frame).or_insert(0);
        *peak = (*peak).max(args);
    }

    /// Handle `JUMPSUB` at `item.pc`; `sp` is the stack pointer after popping
    /// the destination.
    fn call(&mut self, item: &WorkItem<'a>, next: usize, sp: usize) -> Result<(), ValidationError> {
        let offset = item.pc;
        let caller = item.frame;
        let entry = self.destination(item, Flow::BeginSub)?;
        let (args, results) = self.arity(entry)?;

        let available = sp - caller.base;
        if args > available {
            return Err(ValidationError::StackUnderflow {
                offset,
                required: args,
                available,
            });
        }
        let base = sp - args;
        let resumed = base - caller.base + results;
        if resumed > self.limits.max_stack_depth {
            return Err(ValidationError::StackOverflow {
                offset,
                depth: resumed,
                limit: self.limits.max_stack_depth,
            });
        }

        let callee = FrameId::Subroutine(entry);
        trace!("{offset:#06x} call {callee} base={base} args={args} results={results}");
        self.enter(callee, args);
        self.calls.push(CallSite {
            offset,
            caller: caller.id,
            callee,
            base: base - caller.base,
        });

        let continuation = Continuation {
            pc: next,
            sp: base + results,
            frame: caller,
            origin: offset,
        };
        if self.returning.contains(&entry) {
            self.pending.push(continuation.resume());
        } else {
            self.waiting.entry(entry).or_default().push(continuation);
        }

        self.pending.push(WorkItem {
            pc: entry,
            sp,
            frame: Frame {
                id: callee,
                base,
                results,
            },
            edge: Edge::SubroutineCall,
            origin: offset,
            constant: None,
        });
        Ok(())
    }

    /// Handle `RETURNSUB` at `offset` reached with `depth` items in `frame`
    fn ret(&mut self, frame: Frame, offset: usize, depth: usize) -> Result<(), ValidationError> {
        let FrameId::Subroutine(entry) = frame.id else {
            return Err(ValidationError::UnmatchedReturn { offset });
        };
        if depth != frame.results {
            return Err(ValidationError::StackDepthMismatch {
                offset,
                recorded: frame.results,
                found: depth,
            });
        }
        if self.returning.insert(entry) {
            let released = self.waiting.remove(&entry).unwrap_or_default();
            self.pending
                .extend(released.into_iter().map(Continuation::resume));
        }
        Ok(())
    }

    /// Check call chains against the stack limit and build the report
    fn finish(self) -> Result<Validation, ValidationError> {
        let graph = CallGraph::new(&self.peaks, &self.calls);
        let bounds = graph.stack_bounds();

        // Chains that go around a recursive cycle are left to runtime, but
        // every chain without recursion must stay within the limit
        for (frame, bound) in &bounds {
            if let (depth, Some(offset)) = bound.acyclic() {
                if depth > self.limits.max_stack_depth {
                    debug!("call chain from {frame} reaches depth {depth}");
                    return Err(ValidationError::StackOverflow {
                        offset,
                        depth,
                        limit: self.limits.max_stack_depth,
                    });
                }
            }
        }

        if let Some(frame) = graph.recursion_entry() {
            debug!("recursive subroutine calls through {frame}; stack bound checked at runtime");
        }

        let subroutines = self
            .peaks
            .keys()
            .filter_map(|frame| match frame {
                FrameId::Subroutine(entry) => Some(*entry),
                FrameId::Main => None,
            })
            .collect();
        let max_stack_depth = bounds.get(&FrameId::Main).and_then(StackBound::depth);

        debug!(
            "validated {} bytes in {} steps, max stack depth {max_stack_depth:?}",
            self.code.len(),
            self.steps
        );

        Ok(Validation {
            depths: self.depths,
            subroutines,
            steps: self.steps,
            max_stack_depth,
        })
    }
}
