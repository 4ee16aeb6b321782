use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use supplier_recon_lib::commands::{DEFAULT_ARCHIVE_DIR, DEFAULT_EXPORT_DIR};
use supplier_recon_lib::config::{self, TitleBlock};
use supplier_recon_lib::logging::init_logging;
use supplier_recon_lib::{process_files, ProcessEvent, ReconResult, RunOptions, RunSummary};

#[derive(Parser)]
#[command(name = "supplier-recon", version, about = "供应商供货明细表工具")]
struct Cli {
    /// Append diagnostics to this file instead of stderr.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build supplier statements from delivery-detail exports and archive the inputs.
    Process {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// config.txt with hotelname / Sheet_tittle (default: next to the executable).
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value = DEFAULT_EXPORT_DIR)]
        export_dir: PathBuf,
        #[arg(long, default_value = DEFAULT_ARCHIVE_DIR)]
        archive_dir: PathBuf,
        /// Open the export folder when done.
        #[arg(long)]
        open: bool,
        /// Print events as JSON lines.
        #[arg(long)]
        json: bool,
    },
    /// Write the default config.txt if it does not exist yet.
    InitConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn print_event(event: &ProcessEvent, json: bool) {
    if json {
        if let Ok(line) = serde_json::to_string(event) {
            println!("{}", line);
        }
        return;
    }
    match event {
        ProcessEvent::FileStarted { .. } => println!(),
        ProcessEvent::Info { message } | ProcessEvent::Warning { message } => println!("{}", message),
        ProcessEvent::FileFailed { message, .. } => println!("{}", message),
        ProcessEvent::Progress { percent, .. } => println!("[{:>3}%]", percent),
        ProcessEvent::WorkbookWritten { .. }
        | ProcessEvent::FileArchived { .. }
        | ProcessEvent::Finished { .. } => {}
    }
}

fn print_summary(summary: &RunSummary) {
    println!(
        "\n文件: {} 成功 / {} 跳过 / {} 失败，生成对账单 {} 个，警告 {} 条",
        summary.processed,
        summary.skipped,
        summary.failed,
        summary.workbooks.len(),
        summary.warnings.len()
    );
}

fn load_title(path: Option<PathBuf>) -> ReconResult<Option<TitleBlock>> {
    let path = path.unwrap_or_else(config::default_config_path);
    config::load_title_block(&path)
}

fn run(cli: Cli) -> ReconResult<ExitCode> {
    match cli.command {
        Command::Process {
            files,
            config: config_path,
            export_dir,
            archive_dir,
            open,
            json,
        } => {
            let options = RunOptions {
                inputs: files,
                export_dir,
                archive_dir,
                title: load_title(config_path)?,
            };
            let summary = process_files(&options, &mut |event: ProcessEvent| {
                print_event(&event, json)
            })?;
            if !json {
                print_summary(&summary);
            }
            if open && options.export_dir.exists() {
                if let Err(e) = opener::open(&options.export_dir) {
                    println!("无法打开文件夹，请手动访问：{}", options.export_dir.display());
                    tracing::warn!(error = %e, "could not open export folder");
                }
            }
            Ok(if summary.has_failures() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Command::InitConfig {
            config: config_path,
        } => {
            let path = config_path.unwrap_or_else(config::default_config_path);
            if config::ensure_default_config(&path)? {
                println!("已创建默认配置文件：{}", path.display());
            } else {
                println!("配置文件已存在：{}", path.display());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref());
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "run failed");
            eprintln!("处理过程中发生错误: {}", e);
            ExitCode::FAILURE
        }
    }
}
