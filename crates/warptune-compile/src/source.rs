//! Kernel source handles.

use crate::error::CompileError;
use std::path::Path;

/// Kernel source code, either read from a file at compile time or inline.
#[derive(Clone, Debug)]
pub struct KernelSource {
    name: String,
    contents: Option<String>,
}

impl KernelSource {
    /// Source loaded from `path` when the kernel is compiled.
    pub fn from_file(path: impl AsRef<Path>) -> KernelSource {
        KernelSource {
            name: path.as_ref().to_string_lossy().into_owned(),
            contents: None,
        }
    }

    /// Source provided inline; `name` is used for diagnostics only.
    pub fn inline(name: impl Into<String>, contents: impl Into<String>) -> KernelSource {
        KernelSource {
            name: name.into(),
            contents: Some(contents.into()),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.name
    }

    pub fn read(&self) -> Result<String, CompileError> {
        match &self.contents {
            Some(contents) => Ok(contents.clone()),
            None => std::fs::read_to_string(&self.name).map_err(|err| CompileError::SourceIo {
                path: self.name.clone(),
                message: err.to_string(),
            }),
        }
    }
}

impl From<&str> for KernelSource {
    fn from(path: &str) -> KernelSource {
        KernelSource::from_file(path)
    }
}

impl From<String> for KernelSource {
    fn from(path: String) -> KernelSource {
        KernelSource::from_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_source_reads_back() {
        let source = KernelSource::inline("vector_add.cu", "__global__ void vector_add() {}");
        assert_eq!(source.file_name(), "vector_add.cu");
        assert!(source.read().unwrap().contains("vector_add"));
    }

    #[test]
    fn missing_file_reports_the_path() {
        let source = KernelSource::from_file("/nonexistent/kernel.cu");
        match source.read() {
            Err(CompileError::SourceIo { path, .. }) => {
                assert_eq!(path, "/nonexistent/kernel.cu")
            }
            other => panic!("expected SourceIo, got {other:?}"),
        }
    }
}
