use super::{CompileError, Compiler};
use crate::record::FileMap;

/// Concatenates sources in path order, one `// <path>` banner per file.
///
/// Rejects any file with an unterminated `/*` comment, which is enough to
/// exercise the failure path without a real toolchain.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConcatCompiler;

impl Compiler for ConcatCompiler {
    fn compile(&self, files: &FileMap) -> Result<String, CompileError> {
        let mut out = String::new();
        for (path, source) in files {
            check_comments(path, source)?;
            out.push_str("// ");
            out.push_str(path);
            out.push('\n');
            out.push_str(source);
            if !source.ends_with('\n') {
                out.push('\n');
            }
        }
        Ok(out)
    }
}

fn check_comments(path: &str, source: &str) -> Result<(), CompileError> {
    let mut rest = source;
    while let Some(start) = rest.find("/*") {
        let after = &rest[start + 2..];
        match after.find("*/") {
            Some(end) => rest = &after[end + 2..],
            None => {
                let line = source[..source.len() - after.len()].lines().count();
                return Err(CompileError::Syntax {
                    path: path.to_string(),
                    message: format!("unterminated block comment starting on line {line}"),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(entries: &[(&str, &str)]) -> FileMap {
        entries
            .iter()
            .map(|(p, s)| (p.to_string(), s.to_string()))
            .collect()
    }

    #[test]
    fn test_concat_in_path_order() {
        let out = ConcatCompiler
            .compile(&files(&[("b.ts", "two"), ("a.ts", "one\n")]))
            .unwrap();
        assert_eq!(out, "// a.ts\none\n// b.ts\ntwo\n");
    }

    #[test]
    fn test_empty_map_compiles_to_nothing() {
        assert_eq!(ConcatCompiler.compile(&FileMap::new()).unwrap(), "");
    }

    #[test]
    fn test_closed_comments_pass() {
        let src = "/* a */ let x = 1; /* b\n c */";
        assert!(ConcatCompiler.compile(&files(&[("a.ts", src)])).is_ok());
    }

    #[test]
    fn test_unterminated_comment_is_syntax_error() {
        let err = ConcatCompiler
            .compile(&files(&[("ok.ts", "1"), ("bad.ts", "let a;\n/* oops")]))
            .unwrap_err();
        match err {
            CompileError::Syntax { path, message } => {
                assert_eq!(path, "bad.ts");
                assert!(message.contains("line 2"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
