use clap::{ArgAction, ArgGroup, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    author,
    version,
    about,
    help_template = "{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}",
    arg_required_else_help = true
)]
pub struct Args {
    /// Set output verbosity
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress outputs
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output as json
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Disable colors in output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Provide custom config file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum FormatArg {
    /// DEB822 `.sources` file
    Sources,
    /// One-line `.list` file
    List,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List configured sources
    #[clap(name = "list", visible_alias = "ls")]
    List {
        /// Include disabled sources
        #[arg(required = false, short, long)]
        all: bool,

        /// List source files instead of sources
        #[arg(required = false, short, long)]
        files: bool,
    },

    /// Show a single source
    #[command(arg_required_else_help = true)]
    Show {
        /// Source ident
        #[arg(required = true)]
        ident: String,

        /// Print as a one-line entry
        #[arg(required = false, short, long)]
        legacy: bool,
    },

    /// Add a source from a line, a ppa: shortcut or a URI
    #[command(arg_required_else_help = true)]
    Add {
        /// `deb ...` line, `ppa:owner/name` or repository URI
        #[arg(required = true)]
        input: String,

        /// Add the source disabled
        #[arg(required = false, short, long)]
        disable: bool,

        /// Also enable source code
        #[arg(required = false, short, long)]
        source_code: bool,

        /// Human readable name
        #[arg(required = false, short, long)]
        name: Option<String>,

        /// Ident for the new source and its file
        #[arg(required = false, short, long)]
        identifier: Option<String>,

        /// Format of a newly created file
        #[arg(required = false, short, long, value_enum)]
        format: Option<FormatArg>,
    },

    /// Remove a source
    #[command(arg_required_else_help = true)]
    #[clap(name = "remove", visible_alias = "rm")]
    Remove {
        /// Source ident
        #[arg(required = true)]
        ident: String,
    },

    /// Turn source code on or off for a source
    #[command(
        arg_required_else_help = true,
        group(ArgGroup::new("direction").required(true).args(["enable", "disable"]))
    )]
    Source {
        /// Source ident
        #[arg(required = true)]
        ident: String,

        /// Enable source code
        #[arg(required = false, short, long)]
        enable: bool,

        /// Disable source code
        #[arg(required = false, short, long)]
        disable: bool,
    },

    /// Set, remove or inspect the signing key of a source
    #[command(
        arg_required_else_help = true,
        group(ArgGroup::new("action").required(true).args(["path", "ascii", "name", "remove", "info"]))
    )]
    Key {
        /// Source ident
        #[arg(required = true)]
        ident: String,

        /// Install the keyring at this path for the source
        #[arg(required = false, short, long)]
        path: Option<String>,

        /// Install an ASCII-armored key (`-` reads stdin)
        #[arg(required = false, short, long)]
        ascii: Option<String>,

        /// Use a key already in the keyring directory
        #[arg(required = false, short, long)]
        name: Option<String>,

        /// Remove the key from the source
        #[arg(required = false, short, long)]
        remove: bool,

        /// Show information about the key
        #[arg(required = false, long)]
        info: bool,
    },

    /// Convert a source file between .list and .sources
    #[command(arg_required_else_help = true)]
    Convert {
        /// File ident (file name without extension)
        #[arg(required = true)]
        file: String,
    },

    /// Print the configuration file to stdout
    Config,

    /// Generate default config
    #[clap(name = "defconfig")]
    DefConfig,
}
