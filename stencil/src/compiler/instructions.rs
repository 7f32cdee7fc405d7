use std::fmt;
use std::sync::Arc;

use crate::value::Value;

/// Represents an instruction for the VM.
#[derive(Debug, Clone)]
pub enum Instruction {
    /// Emits raw source
    EmitRaw(Arc<str>),

    /// Load a variable from the context.
    Lookup(Arc<str>),

    /// Looks up a path segment on the value on top of the stack.
    GetAttr(Arc<str>),

    /// Loads a constant value.
    LoadConst(Value),

    /// Builds a map of the last n key/value pairs on the stack.
    BuildMap(usize),

    /// Applies a named filter with an optional argument.
    ApplyFilter(Arc<str>, Option<Arc<str>>),

    /// Replaces an absent value with the fallback.
    ApplyDefault(Option<Arc<str>>),

    /// Equality
    Eq,

    /// Inequality
    Ne,

    /// Less than
    Lt,

    /// Less than or equal
    Lte,

    /// Greater than
    Gt,

    /// Greater than or equal
    Gte,

    /// Negates the value on the stack.
    Not,

    /// Emits the value on top of the stack.
    Emit,

    /// Jumps to a specific instruction
    Jump(u32),

    /// Jump if the stack top evaluates to false
    JumpIfFalse(u32),

    /// Jump if the stack top evaluates to false or pops the value
    JumpIfFalseOrPop(u32),

    /// Jump if the stack top evaluates to true or pops the value
    JumpIfTrueOrPop(u32),

    /// Renders a partial for every item of the collection on the stack.
    /// The first argument is the name the item is bound to.
    Each(Arc<str>, Arc<str>),

    /// Includes another template.
    Include(Arc<str>),

    /// Embeds another template with the bindings map on the stack.
    Embed(Arc<str>),
}

#[derive(Debug, Clone)]
struct LineInfo {
    first_instruction: u32,
    line: u32,
    origin: Option<Arc<str>>,
}

/// A compiled sequence of instructions.
///
/// Instructions inlined from a section body remember the template the
/// section was captured from so that errors point to the right file.
#[derive(Clone, Default)]
pub struct Instructions {
    pub(crate) instructions: Vec<Instruction>,
    line_infos: Vec<LineInfo>,
}

impl Instructions {
    /// Creates a new instructions object.
    pub fn new() -> Instructions {
        Instructions::default()
    }

    /// Returns an instruction by index
    #[inline(always)]
    pub fn get(&self, idx: u32) -> Option<&Instruction> {
        self.instructions.get(idx as usize)
    }

    /// Returns an instruction by index mutably
    pub fn get_mut(&mut self, idx: u32) -> Option<&mut Instruction> {
        self.instructions.get_mut(idx as usize)
    }

    /// Adds a new instruction
    pub fn add(&mut self, instr: Instruction) -> u32 {
        let rv = self.instructions.len() as u32;
        self.instructions.push(instr);
        rv
    }

    /// Adds a new instruction with location info.
    pub fn add_with_location(
        &mut self,
        instr: Instruction,
        line: u32,
        origin: Option<&Arc<str>>,
    ) -> u32 {
        let rv = self.add(instr);
        let same_loc = self.line_infos.last().map_or(false, |last| {
            last.line == line && last.origin.as_ref() == origin
        });
        if !same_loc {
            self.line_infos.push(LineInfo {
                first_instruction: rv,
                line,
                origin: origin.cloned(),
            });
        }
        rv
    }

    fn get_line_info(&self, idx: u32) -> Option<&LineInfo> {
        match self
            .line_infos
            .binary_search_by_key(&idx, |x| x.first_instruction)
        {
            Ok(idx) => self.line_infos.get(idx),
            Err(0) => None,
            Err(idx) => self.line_infos.get(idx - 1),
        }
    }

    /// Looks up the line for an instruction
    pub fn get_line(&self, idx: u32) -> Option<usize> {
        self.get_line_info(idx).map(|x| x.line as usize)
    }

    /// Looks up the template an instruction was inlined from.
    ///
    /// `None` means the instruction belongs to the template itself.
    pub fn get_origin(&self, idx: u32) -> Option<&str> {
        self.get_line_info(idx).and_then(|x| x.origin.as_deref())
    }

    /// Returns the number of instructions
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Do we have any instructions?
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

impl fmt::Debug for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        struct InstructionWrapper<'a>(usize, &'a Instruction, Option<usize>);

        impl<'a> fmt::Debug for InstructionWrapper<'a> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                ok!(write!(f, "{:>05x} | {:?}", self.0, self.1));
                if let Some(line) = self.2 {
                    ok!(write!(f, "  [line {}]", line));
                }
                Ok(())
            }
        }

        let mut list = f.debug_list();
        let mut last_line = None;
        for (idx, instr) in self.instructions.iter().enumerate() {
            let line = self.get_line(idx as u32);
            list.entry(&InstructionWrapper(
                idx,
                instr,
                if line != last_line { line } else { None },
            ));
            last_line = line;
        }
        list.finish()
    }
}
