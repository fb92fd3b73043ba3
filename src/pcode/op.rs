//! Micro-operation opcodes and operand varnodes.

/// Storage space of a [`Varnode`].
///
/// The classifier only cares about the distinction between compile-time
/// constants, architectural registers, scratch temporaries, and addressable
/// memory, so the space model is a closed set rather than an open space id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum AddrSpace {
    /// Compile-time constant values. For branch operands the offset is a
    /// micro-op-relative displacement within the current instruction.
    Constant,
    /// Architectural register file; offsets address into it.
    Register,
    /// Scratch temporaries local to one instruction's micro-op sequence.
    Unique,
    /// Addressable memory. For branch operands the offset is the absolute
    /// target address in the code space.
    Ram,
}

/// One operand of a micro-operation: a sized location within a storage space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Varnode {
    /// Storage space this operand lives in.
    pub space: AddrSpace,
    /// Offset within the space (a value, for the constant space).
    pub offset: u64,
    /// Size of the operand in bytes.
    pub size: u32,
}

impl Varnode {
    /// Creates a varnode in an arbitrary space.
    pub fn new(space: AddrSpace, offset: u64, size: u32) -> Self {
        Self { space, offset, size }
    }

    /// Creates a constant-space varnode carrying `value`.
    pub fn constant(value: u64, size: u32) -> Self {
        Self::new(AddrSpace::Constant, value, size)
    }

    /// Creates a register-space varnode.
    pub fn register(offset: u64, size: u32) -> Self {
        Self::new(AddrSpace::Register, offset, size)
    }

    /// Creates a unique-space (scratch) varnode.
    pub fn unique(offset: u64, size: u32) -> Self {
        Self::new(AddrSpace::Unique, offset, size)
    }

    /// Creates a ram-space varnode, used for absolute code targets and memory.
    pub fn ram(offset: u64, size: u32) -> Self {
        Self::new(AddrSpace::Ram, offset, size)
    }

    /// Whether this varnode is a compile-time constant.
    pub fn is_constant(&self) -> bool {
        self.space == AddrSpace::Constant
    }
}

/// The closed set of micro-operation opcodes emitted by the decode engine.
///
/// Semantics of the individual operations are out of scope here; the pipeline
/// only distinguishes control-transfer opcodes from everything else, and the
/// shape of their operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum OpCode {
    /// Copy a value between locations.
    Copy,
    /// Load from a pointer.
    Load,
    /// Store through a pointer.
    Store,
    /// Unconditional transfer; input 0 is the target.
    Branch,
    /// Conditional transfer; input 0 is the target, input 1 the guard.
    CBranch,
    /// Indirect transfer; input 0 holds the storage-derived target.
    BranchInd,
    /// Direct function call; input 0 is the target.
    Call,
    /// Indirect function call; input 0 holds the storage-derived target.
    CallInd,
    /// Call to a user-defined operation; input 0 is the user-op index.
    CallOther,
    /// Return from a function; input 0 holds the return target.
    Return,
    /// Integer equality comparison.
    IntEqual,
    /// Integer inequality comparison.
    IntNotEqual,
    /// Unsigned less-than comparison.
    IntLess,
    /// Unsigned less-or-equal comparison.
    IntLessEqual,
    /// Signed less-than comparison.
    IntSLess,
    /// Signed less-or-equal comparison.
    IntSLessEqual,
    /// Zero extension.
    IntZExt,
    /// Sign extension.
    IntSExt,
    /// Integer addition.
    IntAdd,
    /// Integer subtraction.
    IntSub,
    /// Unsigned carry flag computation.
    IntCarry,
    /// Signed carry flag computation.
    IntSCarry,
    /// Signed borrow flag computation.
    IntSBorrow,
    /// Two's complement negation.
    Int2Comp,
    /// Bitwise negation.
    IntNegate,
    /// Bitwise exclusive or.
    IntXor,
    /// Bitwise and.
    IntAnd,
    /// Bitwise or.
    IntOr,
    /// Left shift.
    IntLeft,
    /// Logical right shift.
    IntRight,
    /// Arithmetic right shift.
    IntSRight,
    /// Integer multiplication.
    IntMult,
    /// Unsigned division.
    IntDiv,
    /// Signed division.
    IntSDiv,
    /// Unsigned remainder.
    IntRem,
    /// Signed remainder.
    IntSRem,
    /// Boolean negation.
    BoolNegate,
    /// Boolean exclusive or.
    BoolXor,
    /// Boolean and.
    BoolAnd,
    /// Boolean or.
    BoolOr,
    /// Concatenate two values.
    Piece,
    /// Extract a subrange of a value.
    Subpiece,
    /// Population count.
    Popcount,
}

/// One elementary micro-operation produced while decoding a single machine
/// instruction.
///
/// Order within the per-instruction sequence is semantically meaningful: the
/// control-flow classifier depends on the exact emission order of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcodeOp {
    /// The operation performed.
    pub opcode: OpCode,
    /// Output operand, when the operation produces a value.
    pub output: Option<Varnode>,
    /// Input operands in engine order.
    pub inputs: Vec<Varnode>,
}

impl PcodeOp {
    /// Creates a micro-operation from its parts.
    pub fn new(opcode: OpCode, output: Option<Varnode>, inputs: Vec<Varnode>) -> Self {
        Self { opcode, output, inputs }
    }

    /// Input operand at `index`, if present.
    pub fn input(&self, index: usize) -> Option<&Varnode> {
        self.inputs.get(index)
    }
}
