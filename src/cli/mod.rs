// FILE: src/cli/mod.rs

mod config;
mod handlers;

use crate::error::Result;
use crate::CompilerOptions;
use clap::{Arg, ArgAction, Command, ValueEnum};
use std::time::Instant;

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

pub struct PtlCli {
    config: config::ConfigFile,
    start_time: Instant,
}

impl Default for PtlCli {
    fn default() -> Self {
        Self::new()
    }
}

impl PtlCli {
    pub fn new() -> Self {
        Self {
            config: config::ConfigFile::default(),
            start_time: Instant::now(),
        }
    }

    pub fn run(&mut self) -> Result<()> {
        self.start_time = Instant::now();
        let matches = self.build_cli().get_matches();

        if let Some(config_path) = matches.get_one::<String>("config") {
            self.config = config::load(config_path)?;
        }

        self.setup_logging(matches.get_count("verbose"));

        match matches.subcommand() {
            Some(("compile", sub_matches)) => handlers::handle_compile_command(self, sub_matches),
            Some(("check", sub_matches)) => handlers::handle_check_command(self, sub_matches),
            Some(("render", sub_matches)) => handlers::handle_render_command(sub_matches),
            Some(("catalog", sub_matches)) => handlers::handle_catalog_command(sub_matches),
            _ => {
                println!("No subcommand specified. Use --help for usage information.");
                Ok(())
            }
        }
    }

    fn build_cli(&self) -> Command {
        Command::new(crate::NAME)
            .version(crate::VERSION)
            .about(crate::DESCRIPTION)
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path (.toml or .json)")
                    .action(ArgAction::Set),
            )
            .arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .help("Increase verbosity (can be used multiple times)")
                    .action(ArgAction::Count),
            )
            .subcommand(
                Command::new("compile")
                    .about("Compile PTL templates to JSON artifacts")
                    .arg(Arg::new("input").help("Input PTL file").required(true).index(1))
                    .arg(Arg::new("output").short('o').long("output").value_name("FILE").help("Output artifact file"))
                    .arg(Arg::new("pretty").long("pretty").help("Pretty-print the JSON artifact").action(ArgAction::SetTrue))
                    .arg(Arg::new("stats").long("stats").help("Show detailed compilation statistics").action(ArgAction::SetTrue))
                    .arg(Arg::new("watch").short('w').long("watch").help("Watch for file changes and recompile").action(ArgAction::SetTrue)),
            )
            .subcommand(
                Command::new("check")
                    .about("Check PTL templates for errors without writing artifacts")
                    .arg(Arg::new("input").help("Input PTL file or directory").required(true).index(1))
                    .arg(Arg::new("recursive").short('r').long("recursive").help("Check all PTL files in directory recursively").action(ArgAction::SetTrue)),
            )
            .subcommand(
                Command::new("render")
                    .about("Compile a template and render it as HTML")
                    .arg(Arg::new("input").help("Input PTL file").required(true).index(1))
                    .arg(Arg::new("data").short('d').long("data").value_name("FILE").help("JSON file with owner/viewer/collections"))
                    .arg(Arg::new("output").short('o').long("output").value_name("FILE").help("Write HTML to a file instead of stdout")),
            )
            .subcommand(
                Command::new("catalog")
                    .about("List the registered components and their prop schemas")
                    .arg(Arg::new("format").short('f').long("format").value_parser(clap::value_parser!(OutputFormat)).default_value("text").help("Catalog output format")),
            )
    }

    fn setup_logging(&self, verbose_count: u8) {
        let log_level = match verbose_count {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        };
        env_logger::Builder::from_default_env()
            .filter_level(log_level)
            .format_timestamp_secs()
            .init();
    }

    /// Options carried by the config file alone.
    pub fn config_options(&self) -> CompilerOptions {
        let mut options = CompilerOptions::default();
        if let Some(depth) = self.config.max_nesting_depth {
            options.max_nesting_depth = depth;
        }
        if let Some(len) = self.config.max_source_len {
            options.max_source_len = len;
        }
        options.pretty_output = self.config.pretty_output.unwrap_or(false);
        options
    }

    pub fn build_compiler_options(&self, matches: &clap::ArgMatches) -> CompilerOptions {
        let mut options = self.config_options();
        options.pretty_output = options.pretty_output || matches.get_flag("pretty");
        options
    }

    pub fn output_directory(&self) -> Option<&str> {
        self.config.output_directory.as_deref()
    }
}
