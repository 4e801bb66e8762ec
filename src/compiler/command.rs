//! External compiler process.
//!
//! The file map is written to stdin as a JSON object, stdout is the payload.

use std::ffi::OsString;
use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;

use super::{CompileError, Compiler};
use crate::record::FileMap;

/// Runs an external command such as a bundler.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    program: OsString,
    args: Vec<OsString>,
}

impl CommandCompiler {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Create from a command array (e.g. `["npx", "esbuild", "--bundle"]`).
    pub fn from_slice<S: AsRef<str>>(cmd: &[S]) -> Self {
        let mut iter = cmd.iter().map(|s| OsString::from(s.as_ref()));
        let mut compiler = Self::new(iter.next().unwrap_or_default());
        compiler.args = iter.collect();
        compiler
    }

    fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

impl Compiler for CommandCompiler {
    fn compile(&self, files: &FileMap) -> Result<String, CompileError> {
        let name = self.program_name();
        let program = which::which(&self.program)
            .map_err(|_| CompileError::NotFound { program: name.clone() })?;

        let io_err = |source: std::io::Error| CompileError::Io {
            program: name.clone(),
            source,
        };

        let input = serde_json::to_vec(files).map_err(|e| io_err(e.into()))?;

        let mut child = Command::new(program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(io_err)?;

        // Feed stdin while stdout and stderr are drained, so a compiler that
        // streams output cannot fill its pipes and stall.
        let stdin = child.stdin.take();
        let (written, output) = thread::scope(|scope| {
            let writer = scope.spawn(move || match stdin {
                // Dropping stdin signals EOF to the compiler
                Some(mut stdin) => stdin.write_all(&input),
                None => Ok(()),
            });
            let output = child.wait_with_output();
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")));
            (written, output)
        });
        let output = output.map_err(io_err)?;

        if !output.status.success() {
            return Err(CompileError::Failed {
                program: name,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        // A compiler may exit successfully without reading all of its input
        if let Err(e) = written
            && e.kind() != std::io::ErrorKind::BrokenPipe
        {
            return Err(io_err(e));
        }

        String::from_utf8(output.stdout).map_err(|_| CompileError::Encoding { program: name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program() {
        let compiler = CommandCompiler::new("tabsync-no-such-compiler-xyz");
        let err = compiler.compile(&FileMap::new()).unwrap_err();
        assert!(matches!(err, CompileError::NotFound { .. }));
    }

    #[test]
    fn test_from_slice() {
        let compiler = CommandCompiler::from_slice(&["npx", "esbuild", "--bundle"]);
        assert_eq!(compiler.program_name(), "npx");
        assert_eq!(compiler.args.len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_stdin_json_to_stdout() {
        let mut files = FileMap::new();
        files.insert("a.ts".into(), "1".into());
        let out = CommandCompiler::new("cat").compile(&files).unwrap();
        assert_eq!(out, r#"{"a.ts":"1"}"#);
    }

    #[cfg(unix)]
    #[test]
    fn test_large_input_streams_through() {
        let mut files = FileMap::new();
        files.insert("big.ts".into(), "x".repeat(1024 * 1024));
        let out = CommandCompiler::new("cat").compile(&files).unwrap();
        assert_eq!(out.len(), serde_json::to_string(&files).unwrap().len());
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_carries_stderr() {
        let compiler = CommandCompiler::from_slice(&["sh", "-c", "echo boom >&2; exit 3"]);
        match compiler.compile(&FileMap::new()).unwrap_err() {
            CompileError::Failed { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
