//! Compiler collaborators: file map in, executable payload out.
//!
//! Callers must not publish anything when `compile` fails.

mod command;
mod concat;

pub use command::CommandCompiler;
pub use concat::ConcatCompiler;

use thiserror::Error;

use crate::record::FileMap;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("syntax error in `{path}`: {message}")]
    Syntax { path: String, message: String },

    #[error("compiler `{program}` not found")]
    NotFound { program: String },

    #[error("`{program}` exited with {status}\n{stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("failed to run `{program}`")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` produced non UTF-8 output")]
    Encoding { program: String },
}

/// Turns a whole file set into one executable payload.
pub trait Compiler: Send + Sync {
    fn compile(&self, files: &FileMap) -> Result<String, CompileError>;
}

/// Build the compiler for a configured command, falling back to
/// [`ConcatCompiler`] when none is set.
pub fn from_command(command: Option<&[String]>) -> Box<dyn Compiler> {
    match command {
        Some(cmd) if !cmd.is_empty() => Box::new(CommandCompiler::from_slice(cmd)),
        _ => Box::new(ConcatCompiler),
    }
}
