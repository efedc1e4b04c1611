//! Compiler driver: file I/O, phase timing and the external toolchain.
//!
//! The pipeline itself is pure; this module is where source files are read,
//! assembly is persisted and `as`/`ld` turn it into an executable. Nothing is
//! written unless every compilation phase succeeded.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use log::{debug, info};
use snafu::{ResultExt, ensure};

use crate::ast::Node;
use crate::error::{CompileError, CompileResult, ReadSourceSnafu, ToolchainSnafu, WriteOutputSnafu};
use crate::target::Target;
use crate::tokenizer::Token;
use crate::{CompileOptions, codegen, parser, tokenizer};

/// Everything the front-end produced for one source text.
#[derive(Debug)]
pub struct Compilation {
  pub tokens: Vec<Token>,
  pub ast: Node,
  pub assembly: String,
}

pub fn read_source(path: &Path) -> CompileResult<String> {
  fs::read_to_string(path).context(ReadSourceSnafu { path })
}

pub fn write_output(path: &Path, contents: &str) -> CompileResult<()> {
  fs::write(path, contents).context(WriteOutputSnafu { path })
}

/// Run all three phases, logging how long each one took.
pub fn compile_source(source: &str, options: &CompileOptions) -> CompileResult<Compilation> {
  let start = Instant::now();
  let tokens = tokenizer::tokenize(source)?;
  info!("tokenization took {:?}", start.elapsed());

  let start = Instant::now();
  let ast = parser::parse(tokens.clone(), source)?;
  info!("parsing took {:?}", start.elapsed());

  let start = Instant::now();
  let assembly = codegen::generate(&ast, source, options)?;
  info!("code generation took {:?}", start.elapsed());

  Ok(Compilation {
    tokens,
    ast,
    assembly,
  })
}

/// Compile `input` and write the assembly to `asm_path`.
pub fn compile_file(
  input: &Path,
  asm_path: &Path,
  options: &CompileOptions,
) -> CompileResult<Compilation> {
  let source = read_source(input)?;
  let compilation = compile_source(&source, options)?;
  write_output(asm_path, &compilation.assembly)?;
  debug!("wrote assembly to '{}'", asm_path.display());
  Ok(compilation)
}

/// Assemble `asm_path` and link the object into `exe_path`. The object file
/// is placed next to the executable.
pub fn assemble_and_link(asm_path: &Path, exe_path: &Path, target: Target) -> CompileResult<()> {
  let start = Instant::now();
  let obj_path = exe_path.with_extension("o");

  run_tool(Command::new("as").arg(asm_path).arg("-o").arg(&obj_path))?;

  let mut ld = Command::new("ld");
  ld.arg(&obj_path)
    .arg("-o")
    .arg(exe_path)
    .args(target.linker_args());
  if target == Target::MacOs
    && let Some(sdk) = macos_sdk_path()
  {
    ld.arg("-syslibroot").arg(sdk);
  }
  run_tool(&mut ld)?;

  info!("assembling and linking took {:?}", start.elapsed());
  Ok(())
}

/// Full build: source file in, executable out. Returns the assembly path.
pub fn build(input: &Path, exe_path: &Path, options: &CompileOptions) -> CompileResult<PathBuf> {
  let asm_path = assembly_path(input, exe_path);
  compile_file(input, &asm_path, options)?;
  assemble_and_link(&asm_path, exe_path, options.target)?;
  Ok(asm_path)
}

/// Assembly lands next to the executable as `.s`, or `.ion.s` when that
/// would be the input file itself.
fn assembly_path(input: &Path, exe_path: &Path) -> PathBuf {
  let asm_path = exe_path.with_extension("s");
  if asm_path == input {
    exe_path.with_extension("ion.s")
  } else {
    asm_path
  }
}

fn run_tool(command: &mut Command) -> CompileResult<()> {
  let tool = command.get_program().to_string_lossy().into_owned();
  debug!("running {command:?}");

  let output = command.output().map_err(|err| CompileError::Toolchain {
    tool: tool.clone(),
    message: format!("failed to run: {err}"),
  })?;

  ensure!(
    output.status.success(),
    ToolchainSnafu {
      tool,
      message: format!(
        "exited with {}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr).trim()
      ),
    }
  );
  Ok(())
}

/// Recent macOS linkers need the SDK root to find `libSystem`.
fn macos_sdk_path() -> Option<PathBuf> {
  let output = Command::new("xcrun")
    .args(["-sdk", "macosx", "--show-sdk-path"])
    .output()
    .ok()?;
  if !output.status.success() {
    return None;
  }
  let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
  (!path.is_empty()).then(|| PathBuf::from(path))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn options() -> CompileOptions {
    CompileOptions {
      target: Target::Linux,
      ..CompileOptions::default()
    }
  }

  #[test]
  fn compile_file_writes_assembly() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("prog.ion");
    let output = dir.path().join("prog.s");
    fs::write(&input, "x = 40 + 2\n").unwrap();

    let compilation = compile_file(&input, &output, &options()).unwrap();
    let written = fs::read_to_string(&output).unwrap();
    assert_eq!(written, compilation.assembly);
    assert!(written.contains("add x0, x1, x0"));
    assert_eq!(compilation.tokens.len(), 6);
  }

  #[test]
  fn failed_compilation_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("bad.ion");
    let output = dir.path().join("bad.s");
    fs::write(&input, "x = (1 + 2\n").unwrap();

    let err = compile_file(&input, &output, &options()).unwrap_err();
    assert!(matches!(err, CompileError::Syntax { .. }));
    assert!(!output.exists());
  }

  #[test]
  fn assembly_never_replaces_the_input() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("prog.s");
    let exe = dir.path().join("prog");
    fs::write(&input, "x = 1\n").unwrap();

    let asm_path = assembly_path(&input, &exe);
    assert_eq!(asm_path, dir.path().join("prog.ion.s"));
    assert_eq!(
      assembly_path(&dir.path().join("prog.ion"), &exe),
      dir.path().join("prog.s")
    );

    // Linking may fail where no AArch64 toolchain exists; the source must
    // survive either way.
    let _ = build(&input, &exe, &options());
    assert_eq!(fs::read_to_string(&input).unwrap(), "x = 1\n");
    assert!(asm_path.exists());
  }

  #[test]
  fn missing_source_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let err = read_source(&dir.path().join("nope.ion")).unwrap_err();
    assert!(matches!(err, CompileError::ReadSource { .. }));
    assert!(err.to_string().contains("nope.ion"));
  }

  #[test]
  fn missing_tool_is_a_toolchain_error() {
    let err = run_tool(&mut Command::new("ionc-no-such-tool")).unwrap_err();
    assert!(matches!(err, CompileError::Toolchain { ref tool, .. } if tool == "ionc-no-such-tool"));
  }
}
