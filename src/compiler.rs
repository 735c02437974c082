//! Compilation driver: source file in, executable or listing out.
//!
//! The pipeline is lexer, parser, code generator, then the system `cc`
//! to assemble and link the emitted text. `-S` stops after the listing
//! is written.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use clap::Parser as ClapParser;
use log::{debug, info};

use crate::codegen;
use crate::error::{CompilerError, Report};
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::symbol_table::ScopeId;

/// Command-line arguments.
#[derive(ClapParser, Debug, Default)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// The input source file
    pub input: String,

    /// Output path: the executable, or the listing with -S
    #[arg(short, long)]
    pub output: Option<String>,

    /// Stop after emitting assembly
    #[arg(short = 'S', long = "assembly-only")]
    pub assembly_only: bool,

    /// Keep the intermediate .s file after linking
    #[arg(long)]
    pub keep_intermediate: bool,

    /// Interleave source-level comments in the listing
    #[arg(long)]
    pub annotate: bool,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

pub struct Compiler {
    cli: Cli,
}

impl Compiler {
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    pub fn run(&self) -> Result<(), CompilerError> {
        let source = fs::read_to_string(&self.cli.input)?;
        info!("compiling {}", self.cli.input);

        let (assembly, has_main) = compile_source(&source, self.cli.annotate)?;

        let asm_path = self.assembly_path();
        fs::write(&asm_path, &assembly)?;
        debug!("assembly written to {}", asm_path.display());
        if self.cli.assembly_only {
            return Ok(());
        }

        // Catch a missing entry point here instead of surfacing the
        // linker's undefined-reference message.
        if !has_main {
            self.discard_intermediate(&asm_path);
            return Err(CompilerError::Driver("no definition of 'main'".into()));
        }

        let output = self
            .cli
            .output
            .clone()
            .unwrap_or_else(|| "a.out".to_string());
        let status = Command::new("cc")
            .arg(&asm_path)
            .arg("-o")
            .arg(&output)
            .status()?;
        self.discard_intermediate(&asm_path);
        if !status.success() {
            return Err(CompilerError::Driver(format!("cc failed: {status}")));
        }
        info!("wrote {output}");
        Ok(())
    }

    /// Where the listing lands: `-o` when `-S` asked for it, otherwise
    /// the input path with its extension swapped for `.s`.
    fn assembly_path(&self) -> PathBuf {
        if self.cli.assembly_only
            && let Some(output) = &self.cli.output
        {
            return PathBuf::from(output);
        }
        Path::new(&self.cli.input).with_extension("s")
    }

    fn discard_intermediate(&self, asm_path: &Path) {
        if !self.cli.keep_intermediate {
            // Best effort; a leftover listing is not an error.
            let _ = fs::remove_file(asm_path);
        }
    }

    pub fn report(&self, err: &CompilerError) {
        crate::error::report(&Report::from_error(err, Some(self.cli.input.clone())));
    }
}

/// Front half of the pipeline: source text to assembly text, plus
/// whether the unit defines `main`, which linking needs to know.
pub fn compile_source(source: &str, annotate: bool) -> Result<(String, bool), CompilerError> {
    let tokens = Lexer::new(source).tokenize()?;
    let (unit, table) = Parser::new(tokens).parse()?;
    let has_main = table
        .find_func(ScopeId::GLOBAL, "main")
        .is_some_and(|f| f.is_defined);
    let assembly = codegen::generate(&unit, &table, annotate)?;
    Ok((assembly, has_main))
}
