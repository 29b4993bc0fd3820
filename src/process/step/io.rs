use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use super::{Step, StepContext, StepKind, Upstream};
use crate::error::{Result, TraversalError};
use crate::process::traverser::Traverser;
use crate::profile::{profile_timer, record_profile_timer, TraversalProfileKind};

fn locator(path: &Path) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(TraversalError::Invalid(
            "the file locator for read() or write() cannot be empty",
        ));
    }
    Ok(path.to_path_buf())
}

/// Loads a whole graph from a file on its first pull.
///
/// The step pulls exactly once: the second pull reports exhaustion whether
/// or not the first one succeeded.
#[derive(Clone)]
pub struct ReadStep {
    path: PathBuf,
    consumed: bool,
}

impl ReadStep {
    /// Fails when `path` is empty.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            path: locator(path.as_ref())?,
            consumed: false,
        })
    }

    /// File read by the step.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn transfer(&self, ctx: &StepContext<'_>) -> Result<()> {
        let graph = ctx.graph(self.name())?;
        if !self.path.exists() {
            return Err(TraversalError::ResourceMissing {
                resource: self.path.clone(),
            });
        }
        let start = profile_timer();
        let file = File::open(&self.path).map_err(|err| TraversalError::io("read", &self.path, err))?;
        let mut reader = BufReader::with_capacity(ctx.config.io_buffer_bytes, file);
        ctx.codec
            .read_graph(&mut reader, graph)
            .map_err(|source| TraversalError::Codec {
                action: "read",
                resource: self.path.clone(),
                source,
            })?;
        record_profile_timer(TraversalProfileKind::Io, start);
        info!(
            path = %self.path.display(),
            codec = ctx.codec.name(),
            "traversal.io.read_complete"
        );
        Ok(())
    }
}

impl Step for ReadStep {
    fn name(&self) -> &'static str {
        "ReadStep"
    }

    fn kind(&self) -> StepKind {
        StepKind::Io
    }

    fn process_next(
        &mut self,
        _upstream: &mut Upstream<'_>,
        ctx: &StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        if self.consumed {
            return Ok(None);
        }
        self.consumed = true;
        self.transfer(ctx)?;
        Ok(Some(Traverser::sentinel()))
    }

    fn describe(&self) -> String {
        format!("ReadStep({})", self.path.display())
    }

    fn mutates_graph(&self) -> bool {
        true
    }
}

/// Writes the whole graph to a file on its first pull.
///
/// Shares the one-shot contract of [`ReadStep`]. An existing file is
/// truncated.
#[derive(Clone)]
pub struct WriteStep {
    path: PathBuf,
    consumed: bool,
}

impl WriteStep {
    /// Fails when `path` is empty.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            path: locator(path.as_ref())?,
            consumed: false,
        })
    }

    /// File written by the step.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn transfer(&self, ctx: &StepContext<'_>) -> Result<()> {
        let graph = ctx.graph(self.name())?;
        let start = profile_timer();
        let file =
            File::create(&self.path).map_err(|err| TraversalError::io("write", &self.path, err))?;
        let mut writer = BufWriter::with_capacity(ctx.config.io_buffer_bytes, file);
        ctx.codec
            .write_graph(&mut writer, graph)
            .map_err(|source| TraversalError::Codec {
                action: "write",
                resource: self.path.clone(),
                source,
            })?;
        writer
            .flush()
            .map_err(|err| TraversalError::io("write", &self.path, err))?;
        record_profile_timer(TraversalProfileKind::Io, start);
        info!(
            path = %self.path.display(),
            codec = ctx.codec.name(),
            "traversal.io.write_complete"
        );
        Ok(())
    }
}

impl Step for WriteStep {
    fn name(&self) -> &'static str {
        "WriteStep"
    }

    fn kind(&self) -> StepKind {
        StepKind::Io
    }

    fn process_next(
        &mut self,
        _upstream: &mut Upstream<'_>,
        ctx: &StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        if self.consumed {
            return Ok(None);
        }
        self.consumed = true;
        self.transfer(ctx)?;
        Ok(Some(Traverser::sentinel()))
    }

    fn describe(&self) -> String {
        format!("WriteStep({})", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_locator_is_an_argument_error() {
        let err = ReadStep::new("").err().unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::Argument);
        assert!(WriteStep::new("").is_err());
        assert!(ReadStep::new("graph.jsonl").is_ok());
    }
}
