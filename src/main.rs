//! Convert fonts between TTF, WOFF and WOFF2, optionally optimizing them on the way

use std::error::Error;
use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use clap::{Parser, ValueEnum};
use woffopt::{Font, OptimizeOptions, optimize, read_font, write_ttf, write_woff};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputType {
    Ttf,
    Woff,
}

impl OutputType {
    fn extension(self) -> &'static str {
        match self {
            Self::Ttf => "ttf",
            Self::Woff => "woff",
        }
    }
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The input font file (TTF, OTF, TTC, WOFF or WOFF2)
    input: PathBuf,

    /// The output file, `-` for stdout. Defaults to the input path with the output type's extension
    output: Option<PathBuf>,

    /// Optimize glyf, name and hmtx tables
    #[arg(short = 'O', long)]
    optimize: bool,

    /// Report what is being done
    #[arg(short, long)]
    verbose: bool,

    /// Only report errors
    #[arg(short, long, conflicts_with = "verbose")]
    silent: bool,

    /// Do everything except writing the output
    #[arg(short, long)]
    dry_run: bool,

    /// List the tables of the input font and exit
    #[arg(short, long)]
    list: bool,

    /// Overwrite the input file
    #[arg(short, long, conflicts_with = "output")]
    in_place: bool,

    /// Font number within a TrueType collection
    #[arg(short = 'f', long, default_value_t = 0)]
    font_index: u32,

    /// Output format
    #[arg(short = 't', long = "type", value_enum, default_value_t = OutputType::Woff)]
    output_type: OutputType,

    /// Replace the WOFF metadata block with the contents of this file
    #[arg(short, long, value_name = "FILE")]
    metadata: Option<PathBuf>,

    /// Replace the WOFF private data block with the contents of this file
    #[arg(short, long, value_name = "FILE")]
    private: Option<PathBuf>,
}

#[derive(Debug, PartialEq, Eq)]
enum Destination {
    Stdout,
    File(PathBuf),
}

impl Args {
    fn log_filter(&self) -> &'static str {
        if self.silent {
            "error"
        } else if self.verbose {
            "info"
        } else {
            "warn"
        }
    }

    fn destination(&self) -> Result<Destination, String> {
        let path = match (&self.output, self.in_place) {
            (Some(path), _) if path == Path::new("-") => return Ok(Destination::Stdout),
            (Some(path), _) => path.clone(),
            (None, true) => self.input.clone(),
            (None, false) => self.input.with_extension(self.output_type.extension()),
        };
        if path == self.input && !self.in_place {
            return Err(format!(
                "refusing to overwrite {} without --in-place",
                path.display()
            ));
        }
        Ok(Destination::File(path))
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

fn main() {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(args.log_filter()))
        .init();

    if let Err(err) = run(&args) {
        eprintln!("{}: {err}", args.input.display());
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let data = std::fs::read(&args.input)?;
    let mut font = read_font(data, args.font_index)?;
    log::info!(
        "read {} tables from {}",
        font.num_tables(),
        args.input.display()
    );

    if args.list {
        list_tables(&font);
        return Ok(());
    }

    replace_woff_blocks(&mut font, args)?;

    if args.optimize {
        let report = optimize(
            &mut font,
            &OptimizeOptions {
                verbose: args.verbose,
            },
        );
        log::info!("optimization saved {} bytes", report.bytes_saved());
    }

    let output = match args.output_type {
        OutputType::Ttf => write_ttf(&font)?,
        OutputType::Woff => write_woff(&font)?,
    };

    let destination = args.destination()?;
    if args.dry_run {
        log::info!("would write {} bytes to {}", output.len(), destination);
        return Ok(());
    }
    match &destination {
        Destination::Stdout => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&output)?;
            stdout.flush()?;
        }
        Destination::File(path) => std::fs::write(path, &output)?,
    }
    log::info!("wrote {} bytes to {}", output.len(), destination);
    Ok(())
}

fn replace_woff_blocks(font: &mut Font, args: &Args) -> Result<(), Box<dyn Error>> {
    if let Some(path) = &args.metadata {
        font.woff_metadata = Some(Bytes::from(std::fs::read(path)?));
        font.modified = true;
        log::info!("WOFF metadata replaced from {}", path.display());
    }
    if let Some(path) = &args.private {
        font.woff_private = Some(Bytes::from(std::fs::read(path)?));
        font.modified = true;
        log::info!("WOFF private data replaced from {}", path.display());
    }
    if (args.metadata.is_some() || args.private.is_some()) && args.output_type == OutputType::Ttf {
        log::warn!("TTF output has no room for WOFF metadata or private data");
    }
    Ok(())
}

fn list_tables(font: &Font) {
    println!("flavor {}", font.flavor);
    for table in font.tables() {
        println!(
            "{} {:>10} {:08x}{}",
            table.tag,
            table.len(),
            table.checksum(),
            if table.modified { " (modified)" } else { "" }
        );
    }
}
