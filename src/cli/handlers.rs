// FILE: src/cli/handlers.rs
use crate::{
    cli::OutputFormat,
    compile_file_with_options, compile_source_with_options, CompilationStats, CompilerOptions,
    DataContext, Registry, Result, TemplateError, TemplateInstance,
};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::path::Path;
use std::sync::mpsc::channel;
use std::time::Instant;

// --- COMPILE ---
pub fn handle_compile_command(cli: &super::PtlCli, matches: &clap::ArgMatches) -> Result<()> {
    let input_path = matches.get_one::<String>("input").unwrap();
    let output_path = matches
        .get_one::<String>("output")
        .map(|s| s.to_string())
        .unwrap_or_else(|| default_output_path(input_path, cli.output_directory()));

    let options = cli.build_compiler_options(matches);

    if matches.get_flag("watch") {
        watch_and_compile(input_path, &output_path, options)
    } else {
        compile_single_file(input_path, &output_path, &options, matches)
    }
}

fn default_output_path(input_path: &str, output_directory: Option<&str>) -> String {
    let output = Path::new(input_path).with_extension("json");
    match (output_directory, output.file_name()) {
        (Some(dir), Some(name)) => Path::new(dir).join(name).to_string_lossy().into_owned(),
        _ => output.to_string_lossy().into_owned(),
    }
}

fn compile_single_file(
    input_path: &str,
    output_path: &str,
    options: &CompilerOptions,
    matches: &clap::ArgMatches,
) -> Result<()> {
    println!("Compiling {} -> {}", input_path, output_path);

    let compile_start = Instant::now();
    let stats = compile_file_with_options(input_path, output_path, options)?;
    let compile_time = compile_start.elapsed();

    println!("Compilation successful!");
    println!("   Nodes: {}", stats.node_count);
    println!(
        "   Islands: {} ({} handlers)",
        stats.island_count, stats.handler_count
    );
    println!("   Time: {:.2}ms", compile_time.as_millis());

    if matches.get_flag("stats") {
        print_detailed_stats(&stats)?;
    }

    Ok(())
}

fn print_detailed_stats(stats: &CompilationStats) -> Result<()> {
    let json = serde_json::to_string_pretty(stats)
        .map_err(|e| TemplateError::invalid_format(e.to_string()))?;
    println!("\nDetailed statistics:\n{}", json);
    Ok(())
}

fn watch_and_compile(
    input_path: &str,
    output_path: &str,
    options: CompilerOptions,
) -> Result<()> {
    println!("Watching {} for changes...", input_path);

    let (tx, rx) = channel();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                if let Err(e) = tx.send(event) {
                    eprintln!("Watch error: {}", e);
                }
            }
        },
        notify::Config::default(),
    )
    .map_err(|e| {
        TemplateError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("Failed to create file watcher: {}", e),
        ))
    })?;

    watcher
        .watch(Path::new(input_path), RecursiveMode::NonRecursive)
        .map_err(|e| {
            TemplateError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to watch file: {}", e),
            ))
        })?;

    if let Err(e) = compile_file_with_options(input_path, output_path, &options) {
        eprintln!("Initial compilation failed: {}", e);
    } else {
        println!("Initial compilation successful");
    }

    loop {
        match rx.recv() {
            Ok(_event) => {
                println!("File changed, recompiling...");
                match compile_file_with_options(input_path, output_path, &options) {
                    Ok(stats) => {
                        println!(
                            "Recompiled successfully ({} nodes, {}ms)",
                            stats.node_count, stats.compile_time_ms
                        );
                    }
                    Err(e) => eprintln!("Compilation failed: {}", e),
                }
            }
            Err(e) => {
                eprintln!("Watch error: {}", e);
                break;
            }
        }
    }

    Ok(())
}

// --- CHECK ---
pub fn handle_check_command(cli: &super::PtlCli, matches: &clap::ArgMatches) -> Result<()> {
    let input_path = matches.get_one::<String>("input").unwrap();
    let recursive = matches.get_flag("recursive");
    let options = cli.config_options();

    if recursive && Path::new(input_path).is_dir() {
        check_directory_recursive(input_path, &options)
    } else {
        check_single_file(input_path, &options)
    }
}

fn check_single_file(input_path: &str, options: &CompilerOptions) -> Result<()> {
    println!("Checking {}", input_path);
    let source = fs::read_to_string(input_path).map_err(|e| TemplateError::FileNotFound {
        path: format!("{}: {}", input_path, e),
    })?;
    match compile_source_with_options(&source, options) {
        Ok(_) => {
            println!("{} - No issues found", input_path);
            Ok(())
        }
        Err(e) => {
            println!("{} - {}", input_path, e);
            Err(e)
        }
    }
}

fn check_directory_recursive(dir_path: &str, options: &CompilerOptions) -> Result<()> {
    let mut total_files = 0;
    let mut error_files = 0;

    for entry in walkdir::WalkDir::new(dir_path) {
        let entry = entry.map_err(|e| {
            TemplateError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Directory traversal error: {}", e),
            ))
        })?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|e| e.to_str()) == Some("ptl")
        {
            total_files += 1;
            if check_single_file(&entry.path().to_string_lossy(), options).is_err() {
                error_files += 1;
            }
        }
    }

    println!("\nCheck summary:");
    println!("   Total files: {}", total_files);
    println!("   Files with errors: {}", error_files);
    if error_files > 0 {
        return Err(TemplateError::invalid_format(format!(
            "{} of {} templates failed",
            error_files, total_files
        )));
    }
    Ok(())
}

// --- RENDER ---
pub fn handle_render_command(matches: &clap::ArgMatches) -> Result<()> {
    let input_path = matches.get_one::<String>("input").unwrap();
    let template = crate::compile_file(input_path)?;

    let ctx = match matches.get_one::<String>("data") {
        Some(data_path) => {
            let raw = fs::read_to_string(data_path).map_err(|e| TemplateError::FileNotFound {
                path: format!("{}: {}", data_path, e),
            })?;
            let doc: serde_json::Value = serde_json::from_str(&raw)
                .map_err(|e| TemplateError::invalid_format(format!("Invalid data file: {}", e)))?;
            DataContext::from_json(doc)
        }
        None => DataContext::new(crate::OwnerProfile::default()),
    };

    let instance = TemplateInstance::new(template, ctx)?;
    let html = instance.render()?;

    match matches.get_one::<String>("output") {
        Some(output_path) => {
            fs::write(output_path, html)?;
            println!("Rendered {} -> {}", input_path, output_path);
        }
        None => println!("{}", html),
    }
    Ok(())
}

// --- CATALOG ---
pub fn handle_catalog_command(matches: &clap::ArgMatches) -> Result<()> {
    let registry = Registry::standard();
    let catalog = registry.catalog();

    match matches.get_one::<OutputFormat>("format").unwrap() {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&catalog)
                .map_err(|e| TemplateError::invalid_format(e.to_string()))?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            for entry in catalog {
                println!("<{}> ({:?})", entry.tag, entry.category);
                for (name, schema) in &entry.props {
                    let required = if schema.required { " (required)" } else { "" };
                    match &schema.default {
                        Some(default) => println!(
                            "    {}{} [default: {}]",
                            name,
                            required,
                            default.render_string()
                        ),
                        None => println!("    {}{}", name, required),
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        assert_eq!(default_output_path("pages/home.ptl", None), "pages/home.json");
        assert_eq!(
            default_output_path("pages/home.ptl", Some("build")),
            "build/home.json"
        );
    }
}
