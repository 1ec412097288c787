use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kstlink")]
#[command(version)]
#[command(about = "Drive a Kst plotting process from the command line")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub session: SessionArgs,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the in-memory stub plotting process until a client quits
    Stub(StubArgs),

    /// Replay one of the demo scripts
    Demo(DemoArgs),

    /// Export the current plots to an image file
    Export(ExportArgs),
}

/// Connection settings shared by every subcommand
#[derive(Args)]
pub struct SessionArgs {
    /// Session name of the plotting process
    #[arg(short, long, global = true, env = "KSTLINK_SESSION")]
    pub name: Option<String>,

    /// Per-call timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Connection attempts before giving up
    #[arg(long, global = true)]
    pub attempts: Option<u32>,

    /// Start the plotting process when nothing answers
    #[arg(long, global = true)]
    pub launch: bool,

    /// Plotting executable used with --launch (defaults to kst2 on PATH)
    #[arg(long, global = true)]
    pub program: Option<PathBuf>,
}

#[derive(Args)]
pub struct StubArgs {
    /// Listen on this socket instead of the one derived from the session name
    #[arg(long)]
    pub socket: Option<PathBuf>,
}

#[derive(Args)]
pub struct DemoArgs {
    /// Demo to run
    #[arg(value_enum)]
    pub demo: Demo,

    /// Run against an in-process stub instead of a real plotting process
    #[arg(long)]
    pub with_stub: bool,

    /// Data file for the data-objects demo (generated when omitted)
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// Output file for the export demo
    #[arg(short, long, default_value = "tmp.png")]
    pub output: PathBuf,

    /// Stop the widget demos after this many events (0 keeps going)
    #[arg(long, default_value_t = 0)]
    pub events: u64,

    /// Stop the widget demos after this many seconds
    #[arg(long, default_value_t = 60)]
    pub duration: u64,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Demo {
    /// Plots, data vectors, equation, spectra, histogram and sum filter
    DataObjects,
    /// Bulk vector transfer in both directions
    VectorIo,
    /// Two tabs of curves exported to an image
    Export,
    /// Ask the plotting process to quit
    Quit,
    /// A button that draws random circles
    Button,
    /// A line edit and a button that plot the typed equation
    TextInput,
}

impl Demo {
    /// Session name the demo uses unless one is given
    pub fn session_name(self) -> &'static str {
        match self {
            Demo::DataObjects => "DataObjects",
            Demo::VectorIo => "VectorIO",
            Demo::Export => "TestX2",
            Demo::Quit => "TestVectors",
            Demo::Button => "testbutton",
            Demo::TextInput => kstlink::DEFAULT_SESSION_NAME,
        }
    }
}

#[derive(Args)]
pub struct ExportArgs {
    /// Destination image file
    pub path: PathBuf,

    /// Export option as NAME=VALUE (all_tabs, autosave_period, format, width, height)
    #[arg(short = 'o', long = "option")]
    pub options: Vec<String>,
}
