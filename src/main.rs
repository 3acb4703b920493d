// atva (andrew's tool for video annotation)
// Copyright (C) 2025 Andrew Nissen

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use crate::config::{AtvaConfig, is_valid_config_field, set_config_field, unset_config_field};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod annotation;
mod clipper;
mod config;
mod controller;
mod files;
mod prefetch;
mod probe;
mod session;
mod store;
mod tasks;
mod web;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Launch the annotation web server")]
    Web {
        #[arg(
            short = 'p',
            long,
            help = "Port to run the web server on",
            default_value = "4620"
        )]
        port: u16,
        #[arg(
            long,
            help = "Host to bind the web server to",
            default_value = "127.0.0.1"
        )]
        host: String,
    },
    #[command(about = "List configured task directories")]
    Tasks,
    #[command(about = "List the directories and video files of a task")]
    Scan {
        #[arg(short = 't', long, help = "Task index", default_value = "0")]
        task: usize,
    },
    #[command(about = "Manage the annotation file of a task")]
    Store {
        #[command(subcommand)]
        store_command: Option<StoreCommands>,
    },
    #[command(about = "Print technical metadata of a video file")]
    #[command(arg_required_else_help = true)]
    Probe {
        #[arg(help = "Path to the video file")]
        path: String,
    },
    #[command(about = "Cut a single clip into a task workspace")]
    #[command(arg_required_else_help = true)]
    Clip {
        #[arg(help = "Path to the video file")]
        path: String,
        #[arg(long, help = "Start offset in seconds", default_value = "0")]
        start: f64,
        #[arg(long, help = "Clip length in seconds (defaults to preview_seconds)")]
        duration: Option<f64>,
        #[arg(long, help = "Suffix appended to the clip file name", default_value = "preview")]
        suffix: String,
        #[arg(short = 't', long, help = "Task index", default_value = "0")]
        task: usize,
    },
    #[command(about = "Cut the preview clips of every directory in a task")]
    Warm {
        #[arg(short = 't', long, help = "Task index", default_value = "0")]
        task: usize,
    },
    #[command(about = "Display current configuration settings")]
    Config {
        #[command(subcommand)]
        config_command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Debug)]
enum StoreCommands {
    #[command(about = "Create the annotation file if it does not exist")]
    Init {
        #[arg(short = 't', long, help = "Task index", default_value = "0")]
        task: usize,
    },
    #[command(about = "Print every row of the annotation file as JSON")]
    Show {
        #[arg(short = 't', long, help = "Task index", default_value = "0")]
        task: usize,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    #[command(about = "Display current configuration settings")]
    Show,
    #[command(about = "Display path to configuration file")]
    Path,
    #[command(about = "Set a configuration field")]
    Set {
        #[arg(help = "Field name to set")]
        field: String,
        #[arg(help = "Value to set")]
        value: String,
    },
    #[command(about = "Unset/clear a configuration field")]
    Unset {
        #[arg(help = "Field name to unset")]
        field: String,
    },
}

#[derive(Serialize)]
struct ScanEntry {
    name: String,
    path: PathBuf,
    videos: Vec<PathBuf>,
    representative: Option<PathBuf>,
}

#[derive(Serialize)]
struct StoreSummary {
    path: PathBuf,
    rows: usize,
    created: bool,
    columns: Vec<String>,
    warnings: Vec<String>,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("atva=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn select_task(cfg: &AtvaConfig, index: usize) -> Result<tasks::Task, Box<dyn std::error::Error>> {
    let all = tasks::load_tasks(cfg)?;
    if all.is_empty() {
        return Err("No task directories configured. Set task_list_path or root_dirs.".into());
    }
    let len = all.len();
    all.into_iter()
        .nth(index)
        .ok_or_else(|| format!("Task {} does not exist ({} configured)", index, len).into())
}

fn unknown_field(field: &str) -> ! {
    eprintln!(
        "Error: Unknown field '{}'. Valid fields are: {}",
        field,
        config::CONFIG_FIELDS.join(", ")
    );
    std::process::exit(1);
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();

    match args.command {
        Some(Commands::Web { host, port }) => {
            let cfg: AtvaConfig = config::load_config()?;
            let temp_dir = cfg.temp_dir();
            config::ensure_shared_dir(&temp_dir)?;

            println!(
                "Starting atva annotation server on \x1b]8;;http://{}:{}\x1b\\http://{}:{}\x1b]8;;\x1b\\",
                host, port, host, port
            );

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async {
                if let Err(e) = web::launch_server(cfg, &host, port).await {
                    eprintln!("Error starting web server: {}", e);
                    std::process::exit(1);
                }
            });
        }
        Some(Commands::Tasks) => {
            let cfg: AtvaConfig = config::load_config()?;
            let all = tasks::load_tasks(&cfg)?;
            println!("{}", serde_json::to_string_pretty(&all)?);
        }
        Some(Commands::Scan { task }) => {
            let cfg: AtvaConfig = config::load_config()?;
            let task = select_task(&cfg, task)?;
            let entries: Vec<ScanEntry> = files::list_items(&task.root)?
                .into_iter()
                .map(|item| {
                    let videos = files::list_videos(&item.absolute_path, cfg.schema);
                    let representative = files::representative_file(&videos, cfg.schema).cloned();
                    ScanEntry {
                        name: item.name,
                        path: item.absolute_path,
                        videos,
                        representative,
                    }
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        Some(Commands::Store { store_command }) => match store_command {
            Some(StoreCommands::Init { task }) => {
                let cfg: AtvaConfig = config::load_config()?;
                let task = select_task(&cfg, task)?;
                task.ensure_workspace()?;
                let items = files::list_items(&task.root)?;
                let (store, created) =
                    store::AnnotationStore::load_or_create(&task.store_path(), cfg.schema, || {
                        files::all_video_paths(&items, cfg.schema)
                    })?;
                let summary = StoreSummary {
                    path: store.path().to_path_buf(),
                    rows: store.rows().len(),
                    created,
                    columns: store::column_names(store.schema())
                        .into_iter()
                        .map(str::to_string)
                        .chain(store.extra_columns().iter().cloned())
                        .collect(),
                    warnings: store.load_warnings().to_vec(),
                };
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            Some(StoreCommands::Show { task }) => {
                let cfg: AtvaConfig = config::load_config()?;
                let task = select_task(&cfg, task)?;
                match store::AnnotationStore::load(&task.store_path(), cfg.schema) {
                    Ok(store) => println!("{}", serde_json::to_string_pretty(store.rows())?),
                    Err(e) => {
                        eprintln!("Error reading annotation file: {}", e);
                        std::process::exit(1);
                    }
                }
            }
            None => {}
        },
        Some(Commands::Probe { path }) => {
            let cfg: AtvaConfig = config::load_config()?;
            let info = probe::probe(&cfg, Path::new(&path));
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Some(Commands::Clip {
            path,
            start,
            duration,
            suffix,
            task,
        }) => {
            let cfg: AtvaConfig = config::load_config()?;
            let task = select_task(&cfg, task)?;
            task.ensure_workspace()?;
            let request = clipper::ClipRequest {
                source: PathBuf::from(&path),
                start: start.max(0.0),
                duration: duration.unwrap_or(cfg.preview_seconds as f64),
                suffix,
            };
            match clipper::produce_clip(&cfg, task.clip_dir(), &request) {
                Ok(output_path) => println!("{}", output_path.display()),
                Err(e) => {
                    eprintln!("Error cutting clip: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Some(Commands::Warm { task }) => {
            let cfg: AtvaConfig = config::load_config()?;
            let task = select_task(&cfg, task)?;
            task.ensure_workspace()?;
            let sources = controller::representative_files(&cfg, &task)?;
            let pool = prefetch::Prefetcher::new(cfg.workers)?;

            let pb = ProgressBar::new(sources.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                    .progress_chars("#>-"),
            );
            pb.set_message(format!("Cutting previews for {}", task.name));

            let produced = pool.warm_blocking(&cfg, task.clip_dir(), &sources, || pb.inc(1));

            pb.finish_with_message(format!("{} clips ready", produced.len()));
            println!("{}", serde_json::to_string_pretty(&produced)?);
        }
        Some(Commands::Config { config_command }) => match config_command {
            Some(ConfigCommands::Show) | None => {
                let cfg: AtvaConfig = config::load_stored_config()?;
                let json_output = serde_json::to_string_pretty(&cfg)?;
                println!("{}", json_output);
            }
            Some(ConfigCommands::Path) => {
                let config_path = config::config_file_path()?;
                println!("{}", config_path.display());
            }
            Some(ConfigCommands::Set { field, value }) => {
                if !is_valid_config_field(&field) {
                    unknown_field(&field);
                }

                let mut cfg: AtvaConfig = config::load_stored_config()?;

                if let Err(e) = set_config_field(&mut cfg, &field, &value) {
                    eprintln!("Error setting field: {}", e);
                    std::process::exit(1);
                }

                config::store_config(&cfg)?;
                println!("Set {} = {}", field, value);
            }
            Some(ConfigCommands::Unset { field }) => {
                if !is_valid_config_field(&field) {
                    unknown_field(&field);
                }

                let mut cfg: AtvaConfig = config::load_stored_config()?;

                if let Err(e) = unset_config_field(&mut cfg, &field) {
                    eprintln!("Error unsetting field: {}", e);
                    std::process::exit(1);
                }

                config::store_config(&cfg)?;
                println!("Unset {}", field);
            }
        },
        None => {}
    }

    Ok(())
}
