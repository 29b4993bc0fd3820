//! Replays recorded bytecode onto a traversal source.
//!
//! Remote servers and bulk-parallel engines receive bytecode, not step
//! chains; the translator rebuilds an equivalent traversal on their own
//! source so their own strategy set applies.

use tracing::debug;

use crate::error::{Result, TraversalError};
use crate::process::bytecode::{symbols, Argument, Bytecode, Instruction};
use crate::process::source::TraversalSource;
use crate::process::strategy::StrategyRegistry;
use crate::process::traversal::Traversal;
use crate::value::Value;

/// Rebuilds traversals from bytecode.
#[derive(Clone, Default)]
pub struct Translator {
    registry: StrategyRegistry,
}

impl Translator {
    /// Translator resolving strategy names through `registry`.
    pub fn new(registry: StrategyRegistry) -> Self {
        Self { registry }
    }

    /// Registry used for `withStrategies`.
    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Replays `bytecode` onto `source`.
    ///
    /// Source instructions configure a clone of `source`; the first step
    /// instruction must be a spawn and the rest extend the spawned traversal.
    pub fn translate(&self, source: &TraversalSource, bytecode: &Bytecode) -> Result<Traversal> {
        let mut configured = source.clone();
        for instruction in bytecode.source_instructions() {
            configured = self.configure(&configured, instruction)?;
        }
        let mut steps = bytecode.step_instructions().iter();
        let Some(first) = steps.next() else {
            return Err(TraversalError::invalid_instruction(
                "bytecode",
                "no spawn instruction to replay",
            ));
        };
        let mut traversal = self.spawn(&configured, first)?;
        for instruction in steps {
            traversal = self.extend(traversal, instruction)?;
        }
        Ok(traversal)
    }

    /// Replays nested bytecode, which has no source part and no spawn.
    pub fn translate_anonymous(&self, bytecode: &Bytecode) -> Result<Traversal> {
        if let Some(instruction) = bytecode.source_instructions().first() {
            return Err(TraversalError::invalid_instruction(
                instruction.name.clone(),
                "nested traversals cannot configure a source",
            ));
        }
        bytecode
            .step_instructions()
            .iter()
            .try_fold(Traversal::anonymous(), |traversal, instruction| {
                self.extend(traversal, instruction)
            })
    }

    fn configure(&self, source: &TraversalSource, instruction: &Instruction) -> Result<TraversalSource> {
        Ok(match instruction.name.as_str() {
            symbols::WITH_BULK => {
                let bulk = match value_at(instruction, 0)? {
                    Value::Bool(bulk) => *bulk,
                    _ => return Err(bad_argument(instruction, "expected a boolean")),
                };
                source.with_bulk(bulk)
            }
            symbols::WITH_PATH => source.with_path(),
            symbols::WITH_SACK => source.with_sack(value_at(instruction, 0)?.clone()),
            symbols::WITH_STRATEGIES => {
                let strategies = instruction
                    .args
                    .iter()
                    .map(|arg| self.registry.resolve_argument(arg))
                    .collect::<Result<Vec<_>>>()?;
                source.with_registry(self.registry.clone()).with_strategies(strategies)?
            }
            symbols::WITHOUT_STRATEGIES => {
                let names = strings(instruction)?;
                source.without_strategies(names.iter().map(String::as_str))
            }
            // the receiving engine is already the computer
            symbols::WITH_COMPUTER => {
                debug!(instruction = %instruction, "traversal.replay.skip_computer");
                source.clone()
            }
            _ => return Err(unknown(instruction)),
        })
    }

    fn spawn(&self, source: &TraversalSource, instruction: &Instruction) -> Result<Traversal> {
        let args = &instruction.args;
        Ok(match instruction.name.as_str() {
            symbols::V => source.v(ids(instruction)?),
            symbols::E => source.e(ids(instruction)?),
            symbols::ADD_V => match args.first() {
                None => source.add_v_default(),
                Some(Argument::Bytecode(nested)) => {
                    source.add_v_from(self.translate_anonymous(nested)?)
                }
                Some(_) => source.add_v(str_at(instruction, 0)?),
            },
            symbols::ADD_E => match args.first() {
                Some(Argument::Bytecode(nested)) => {
                    source.add_e_from(self.translate_anonymous(nested)?)
                }
                Some(_) => source.add_e(str_at(instruction, 0)?),
                None => return Err(bad_argument(instruction, "an edge label is required")),
            },
            symbols::INJECT => {
                let mut values = Vec::new();
                flatten(instruction, args, &mut values)?;
                source.inject(values.into_iter().cloned())
            }
            symbols::READ => source.read(str_at(instruction, 0)?)?,
            symbols::WRITE => source.write(str_at(instruction, 0)?)?,
            _ => {
                return Err(TraversalError::invalid_instruction(
                    instruction.name.clone(),
                    "the first step instruction must spawn a traversal",
                ))
            }
        })
    }

    fn extend(&self, traversal: Traversal, instruction: &Instruction) -> Result<Traversal> {
        Ok(match instruction.name.as_str() {
            symbols::IDENTITY => traversal.identity(),
            symbols::HAS_LABEL => traversal.has_label(strings(instruction)?),
            symbols::HAS_ID => traversal.has_id(ids(instruction)?),
            symbols::HAS => traversal.has(str_at(instruction, 0)?, value_at(instruction, 1)?.clone()),
            symbols::FILTER => {
                let nested = instruction
                    .args
                    .first()
                    .and_then(Argument::as_bytecode)
                    .ok_or_else(|| bad_argument(instruction, "expected a nested traversal"))?;
                traversal.filter(self.translate_anonymous(nested)?)
            }
            symbols::LIMIT => traversal.limit(id_at(instruction, 0)?),
            symbols::ID => traversal.id(),
            symbols::LABEL => traversal.label(),
            symbols::VALUES => traversal.values(strings(instruction)?),
            symbols::CONSTANT => traversal.constant(value_at(instruction, 0)?.clone()),
            symbols::SACK => traversal.sack(),
            symbols::OUT => traversal.out(strings(instruction)?),
            symbols::IN => traversal.in_(strings(instruction)?),
            symbols::BOTH => traversal.both(strings(instruction)?),
            symbols::PROPERTY => {
                traversal.property(str_at(instruction, 0)?, value_at(instruction, 1)?.clone())
            }
            symbols::BARRIER => traversal.barrier(),
            symbols::COUNT => traversal.count(),
            symbols::AS => traversal.as_(str_at(instruction, 0)?),
            symbols::FROM => traversal.from_v(id_at(instruction, 0)?),
            symbols::TO => traversal.to_v(id_at(instruction, 0)?),
            _ => return Err(unknown(instruction)),
        })
    }
}

fn unknown(instruction: &Instruction) -> TraversalError {
    TraversalError::invalid_instruction(instruction.name.clone(), "unknown instruction")
}

fn bad_argument(instruction: &Instruction, reason: &str) -> TraversalError {
    TraversalError::invalid_instruction(instruction.name.clone(), format!("{reason} in {instruction}"))
}

fn flatten<'a>(
    instruction: &Instruction,
    args: &'a [Argument],
    out: &mut Vec<&'a Value>,
) -> Result<()> {
    for arg in args {
        match arg {
            Argument::Scalar(value) => out.push(value),
            Argument::Collection(items) => flatten(instruction, items, out)?,
            Argument::Bytecode(_) => {
                return Err(bad_argument(instruction, "unexpected nested traversal"))
            }
        }
    }
    Ok(())
}

fn strings(instruction: &Instruction) -> Result<Vec<String>> {
    let mut values = Vec::new();
    flatten(instruction, &instruction.args, &mut values)?;
    values
        .into_iter()
        .map(|value| {
            value
                .as_str()
                .map(str::to_owned)
                .ok_or_else(|| bad_argument(instruction, "expected strings"))
        })
        .collect()
}

fn ids(instruction: &Instruction) -> Result<Vec<u64>> {
    let mut values = Vec::new();
    flatten(instruction, &instruction.args, &mut values)?;
    values
        .into_iter()
        .map(|value| as_id(instruction, value))
        .collect()
}

fn as_id(instruction: &Instruction, value: &Value) -> Result<u64> {
    value
        .as_int()
        .and_then(|id| u64::try_from(id).ok())
        .ok_or_else(|| bad_argument(instruction, "expected a non-negative integer"))
}

fn value_at(instruction: &Instruction, idx: usize) -> Result<&Value> {
    instruction
        .args
        .get(idx)
        .and_then(Argument::as_value)
        .ok_or_else(|| bad_argument(instruction, &format!("missing argument {idx}")))
}

fn str_at(instruction: &Instruction, idx: usize) -> Result<&str> {
    value_at(instruction, idx)?
        .as_str()
        .ok_or_else(|| bad_argument(instruction, &format!("argument {idx} must be a string")))
}

fn id_at(instruction: &Instruction, idx: usize) -> Result<u64> {
    as_id(instruction, value_at(instruction, idx)?)
}
