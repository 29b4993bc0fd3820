//! Instruction log recorded by traversal sources and traversals.
//!
//! Bytecode is the only thing that crosses an engine boundary: a remote server
//! or a bulk-parallel engine rebuilds the traversal by replaying it.

use std::fmt;
use std::hash::Hasher;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::Xxh64;

use crate::error::{Result, TraversalError};
use crate::value::Value;

/// Instruction names recorded by sources and traversals.
pub mod symbols {
    #![allow(missing_docs)]

    pub const WITH_BULK: &str = "withBulk";
    pub const WITH_PATH: &str = "withPath";
    pub const WITH_SACK: &str = "withSack";
    pub const WITH_STRATEGIES: &str = "withStrategies";
    pub const WITHOUT_STRATEGIES: &str = "withoutStrategies";
    pub const WITH_COMPUTER: &str = "withComputer";

    pub const V: &str = "V";
    pub const E: &str = "E";
    pub const ADD_V: &str = "addV";
    pub const ADD_E: &str = "addE";
    pub const INJECT: &str = "inject";
    pub const READ: &str = "read";
    pub const WRITE: &str = "write";

    pub const FROM: &str = "from";
    pub const TO: &str = "to";
    pub const AS: &str = "as";
    pub const IDENTITY: &str = "identity";
    pub const HAS_LABEL: &str = "hasLabel";
    pub const HAS_ID: &str = "hasId";
    pub const HAS: &str = "has";
    pub const FILTER: &str = "filter";
    pub const LIMIT: &str = "limit";
    pub const ID: &str = "id";
    pub const LABEL: &str = "label";
    pub const VALUES: &str = "values";
    pub const CONSTANT: &str = "constant";
    pub const SACK: &str = "sack";
    pub const OUT: &str = "out";
    pub const IN: &str = "in";
    pub const BOTH: &str = "both";
    pub const PROPERTY: &str = "property";
    pub const BARRIER: &str = "barrier";
    pub const COUNT: &str = "count";
}

/// One argument of an [`Instruction`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Argument {
    /// Scalar or element value.
    Scalar(Value),
    /// Ordered collection of arguments.
    Collection(Vec<Argument>),
    /// Nested traversal.
    Bytecode(Bytecode),
}

impl Argument {
    /// Returns the scalar payload.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Argument::Scalar(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the string payload of a scalar.
    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    /// Returns the nested bytecode.
    pub fn as_bytecode(&self) -> Option<&Bytecode> {
        match self {
            Argument::Bytecode(bytecode) => Some(bytecode),
            _ => None,
        }
    }
}

macro_rules! scalar_argument {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Argument {
                fn from(value: $ty) -> Self {
                    Argument::Scalar(value.into())
                }
            }
        )*
    };
}

scalar_argument!(Value, &str, String, bool, i64, i32, f64);

impl TryFrom<u64> for Argument {
    type Error = TraversalError;

    fn try_from(value: u64) -> Result<Self> {
        Value::try_from(value).map(Argument::Scalar)
    }
}

impl From<Bytecode> for Argument {
    fn from(bytecode: Bytecode) -> Self {
        Argument::Bytecode(bytecode)
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Scalar(Value::String(s)) => write!(f, "{s:?}"),
            Argument::Scalar(value) => write!(f, "{value}"),
            Argument::Collection(items) => {
                f.write_str("[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Argument::Bytecode(bytecode) => write!(f, "{bytecode}"),
        }
    }
}

/// A named operation and its ordered arguments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// Operation name, one of [`symbols`] for built-in operations.
    pub name: String,
    /// Ordered arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Argument>,
}

impl Instruction {
    /// Creates an instruction.
    pub fn new(name: impl Into<String>, args: Vec<Argument>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (idx, arg) in self.args.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(")")
    }
}

/// Ordered source and step instructions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Bytecode {
    #[serde(default, rename = "source", skip_serializing_if = "Vec::is_empty")]
    source_instructions: Vec<Instruction>,
    #[serde(default, rename = "step", skip_serializing_if = "Vec::is_empty")]
    step_instructions: Vec<Instruction>,
}

impl Bytecode {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a source instruction.
    pub fn add_source(&mut self, name: impl Into<String>, args: Vec<Argument>) {
        self.source_instructions.push(Instruction::new(name, args));
    }

    /// Appends a step instruction.
    pub fn add_step(&mut self, name: impl Into<String>, args: Vec<Argument>) {
        self.step_instructions.push(Instruction::new(name, args));
    }

    /// Source instructions in call order.
    pub fn source_instructions(&self) -> &[Instruction] {
        &self.source_instructions
    }

    /// Step instructions in call order.
    pub fn step_instructions(&self) -> &[Instruction] {
        &self.step_instructions
    }

    /// Returns true when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.source_instructions.is_empty() && self.step_instructions.is_empty()
    }

    /// Encodes as JSON.
    pub fn to_wire(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes from JSON.
    pub fn from_wire(wire: &str) -> Result<Self> {
        Ok(serde_json::from_str(wire)?)
    }

    /// Encodes as JSON into `writer`.
    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    /// Decodes JSON from `reader`.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Stable hash of the instruction sequence.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Xxh64::new(0);
        hash_instructions(&self.source_instructions, &mut hasher);
        hasher.write_u8(0xff);
        hash_instructions(&self.step_instructions, &mut hasher);
        hasher.digest()
    }
}

fn hash_instructions(instructions: &[Instruction], hasher: &mut Xxh64) {
    for instruction in instructions {
        hasher.write(instruction.name.as_bytes());
        hasher.write_u64(instruction.args.len() as u64);
        for arg in &instruction.args {
            hash_argument(arg, hasher);
        }
    }
}

fn hash_argument(arg: &Argument, hasher: &mut Xxh64) {
    match arg {
        Argument::Scalar(value) => {
            hasher.write_u8(0);
            value.hash_into(hasher);
        }
        Argument::Collection(items) => {
            hasher.write_u8(1);
            hasher.write_u64(items.len() as u64);
            for item in items {
                hash_argument(item, hasher);
            }
        }
        Argument::Bytecode(bytecode) => {
            hasher.write_u8(2);
            hasher.write_u64(bytecode.fingerprint());
        }
    }
}

impl fmt::Display for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = |f: &mut fmt::Formatter<'_>, items: &[Instruction]| -> fmt::Result {
            f.write_str("[")?;
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{item}")?;
            }
            f.write_str("]")
        };
        f.write_str("[")?;
        list(f, &self.source_instructions)?;
        f.write_str(", ")?;
        list(f, &self.step_instructions)?;
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Bytecode {
        let mut nested = Bytecode::new();
        nested.add_step(symbols::HAS_LABEL, vec!["person".into()]);
        let mut bytecode = Bytecode::new();
        bytecode.add_source(symbols::WITH_BULK, vec![false.into()]);
        bytecode.add_step(symbols::V, vec![]);
        bytecode.add_step(symbols::FILTER, vec![Argument::Bytecode(nested)]);
        bytecode.add_step(
            symbols::VALUES,
            vec![Argument::Collection(vec!["name".into(), "age".into()])],
        );
        bytecode
    }

    #[test]
    fn wire_form_round_trips_nested_bytecode() {
        let bytecode = sample();
        let wire = bytecode.to_wire().unwrap();
        let decoded = Bytecode::from_wire(&wire).unwrap();
        assert_eq!(decoded, bytecode);
        assert_eq!(decoded.to_wire().unwrap(), wire);
        assert_eq!(decoded.fingerprint(), bytecode.fingerprint());
    }

    #[test]
    fn clones_are_independent() {
        let original = sample();
        let mut copy = original.clone();
        copy.add_step(symbols::COUNT, vec![]);
        assert_eq!(original.step_instructions().len(), 3);
        assert_eq!(copy.step_instructions().len(), 4);
        assert_ne!(original.fingerprint(), copy.fingerprint());
    }

    #[test]
    fn display_lists_both_sequences() {
        let rendered = sample().to_string();
        assert_eq!(
            rendered,
            "[[withBulk(false)], [V(), filter([[], [hasLabel(\"person\")]]), values([\"name\", \"age\"])]]"
        );
    }
}
