//! Batch driver: runs each input file through the pipeline, archives it, and
//! reports everything as [`ProcessEvent`]s.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::TitleBlock;
use crate::error::{ReconError, ReconResult};
use crate::excel;
use crate::services::{excel_scanner, grouping, normalizer};
use crate::types::{EventSink, ProcessEvent, RunSummary};

pub const WARNING_PREFIX: &str = "警告：";
pub const DEFAULT_EXPORT_DIR: &str = "export";
pub const DEFAULT_ARCHIVE_DIR: &str = "archive";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOptions {
    pub inputs: Vec<PathBuf>,
    pub export_dir: PathBuf,
    pub archive_dir: PathBuf,
    /// `None` when no config file was found; statements then get a blank title block.
    pub title: Option<TitleBlock>,
}

impl RunOptions {
    pub fn new(inputs: Vec<PathBuf>, title: Option<TitleBlock>) -> Self {
        Self {
            inputs,
            export_dir: PathBuf::from(DEFAULT_EXPORT_DIR),
            archive_dir: PathBuf::from(DEFAULT_ARCHIVE_DIR),
            title,
        }
    }
}

/// What happened to one input file that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Skipped,
    Completed {
        workbooks: Vec<PathBuf>,
        archived_to: PathBuf,
    },
}

struct Reporter<'a, S: EventSink + ?Sized> {
    sink: &'a mut S,
    summary: RunSummary,
}

impl<'a, S: EventSink + ?Sized> Reporter<'a, S> {
    fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("{}", message);
        self.sink.emit(ProcessEvent::Info { message });
    }

    fn warn(&mut self, message: impl AsRef<str>) {
        let message = format!("{}{}", WARNING_PREFIX, message.as_ref());
        tracing::debug!("{}", message);
        self.summary.warnings.push(message.clone());
        self.sink.emit(ProcessEvent::Warning { message });
    }

    fn emit(&mut self, event: ProcessEvent) {
        self.sink.emit(event);
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn ensure_dir<S: EventSink + ?Sized>(dir: &Path, reporter: &mut Reporter<'_, S>) -> ReconResult<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| ReconError::io(dir, e))?;
        reporter.info(format!("创建文件夹: {}", dir.display()));
    }
    Ok(())
}

/// Archive destination for `file_name`: the plain name, or `{stem}_{timestamp}{ext}`
/// when that name is already taken.
pub fn archive_target(archive_dir: &Path, file_name: &str, timestamp: &str) -> PathBuf {
    let plain = archive_dir.join(file_name);
    if !plain.exists() {
        return plain;
    }
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let renamed = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, timestamp, ext.to_string_lossy()),
        None => format!("{}_{}", stem, timestamp),
    };
    archive_dir.join(renamed)
}

fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        // Cross-device moves cannot be renamed.
        Err(_) => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}

/// Move a processed input into the archive without overwriting earlier archives.
pub fn archive_file(input: &Path, archive_dir: &Path) -> ReconResult<PathBuf> {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ReconError::InvalidPath(input.to_path_buf()))?;
    let timestamp = chrono::Local::now().format("%Y%m%d%H%M%S").to_string();
    let target = archive_target(archive_dir, &name, &timestamp);
    move_file(input, &target).map_err(|e| ReconError::io(input, e))?;
    Ok(target)
}

/// Run one file through header detection, normalization, grouping and
/// emission, then archive it. Warnings go to the reporter; hard failures are
/// returned and leave the input in place.
fn process_file<S: EventSink + ?Sized>(
    input: &Path,
    options: &RunOptions,
    reporter: &mut Reporter<'_, S>,
) -> ReconResult<FileOutcome> {
    let title = match &options.title {
        Some(title) => title.clone(),
        None => {
            reporter.warn("未找到config.txt文件,将会导致对帐单标题错误");
            TitleBlock::default()
        }
    };

    let grid = excel_scanner::read_first_sheet(input)?;
    let header = excel_scanner::detect_header_row(&grid);
    if header.detected {
        reporter.info(format!(
            "找到表头行: 第{}行，匹配度: {}/{}",
            header.row + 1,
            header.matches,
            crate::models::SCHEMA_LEN
        ));
    } else {
        reporter.warn(format!(
            "未找到表头行，使用默认值({})",
            excel_scanner::DEFAULT_HEADER_ROW
        ));
    }

    let mut sheet = normalizer::normalize_sheet(&grid, header.row);
    let missing = sheet.missing_columns();
    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(|c| c.label()).collect();
        reporter.warn(format!("文件缺少以下列：{}", names.join(", ")));
        return Ok(FileOutcome::Skipped);
    }
    if !sheet.unexpected_return_markers.is_empty() {
        reporter.warn(format!(
            "退货列包含无法识别的标记：{}，已按非退货处理",
            sheet.unexpected_return_markers.join(", ")
        ));
    }

    grouping::apply_tax_rates(&mut sheet);

    let Some(year_month) = sheet.earliest_year_month() else {
        reporter.warn("文件中没有有效的收货日期，无法确定年月。");
        return Ok(FileOutcome::Skipped);
    };
    let month_dir = options.export_dir.join(&year_month);
    if !month_dir.exists() {
        fs::create_dir_all(&month_dir).map_err(|e| ReconError::io(&month_dir, e))?;
    }

    let grouped = grouping::group_rows(&sheet);
    for warning in &grouped.warnings {
        reporter.warn(warning);
    }

    let mut workbooks = Vec::with_capacity(grouped.groups.len());
    for group in &grouped.groups {
        if let Some(warning) = group.cross_month_warning() {
            reporter.warn(warning);
        }
        let statement = grouping::build_statement(group, &sheet.columns);
        let file_name =
            excel::statement_file_name(&year_month, &group.key.supplier, &group.key.tax_rate);
        let path = month_dir.join(&file_name);
        excel::write_statement(&statement, &title, &path)?;
        reporter.info(format!("已成功创建 {}", file_name));
        reporter.emit(ProcessEvent::WorkbookWritten { path: path.clone() });
        workbooks.push(path);
    }

    let archived_to = archive_file(input, &options.archive_dir)?;
    reporter.info(format!("已成功归档文件 {}", file_label(input)));
    reporter.emit(ProcessEvent::FileArchived {
        file: file_label(input),
        archived_to: archived_to.clone(),
    });

    Ok(FileOutcome::Completed {
        workbooks,
        archived_to,
    })
}

/// Process every input in order. A failing file is reported and skipped; only
/// failing to prepare the export or archive folders aborts the run.
pub fn process_files<S: EventSink + ?Sized>(
    options: &RunOptions,
    sink: &mut S,
) -> ReconResult<RunSummary> {
    let inputs: Vec<&PathBuf> = options
        .inputs
        .iter()
        .filter(|p| !p.as_os_str().is_empty())
        .collect();
    let mut reporter = Reporter {
        sink,
        summary: RunSummary {
            total_files: inputs.len(),
            ..RunSummary::default()
        },
    };
    if inputs.is_empty() {
        reporter.info("请先选择要处理的Excel文件");
        let summary = reporter.summary.clone();
        reporter.emit(ProcessEvent::Finished {
            summary: summary.clone(),
        });
        return Ok(summary);
    }

    ensure_dir(&options.export_dir, &mut reporter)?;
    ensure_dir(&options.archive_dir, &mut reporter)?;

    let total = inputs.len();
    for (index, input) in inputs.into_iter().enumerate() {
        let file = file_label(input);
        let span = tracing::info_span!("file", name = %file);
        let _guard = span.enter();
        reporter.emit(ProcessEvent::FileStarted {
            file: file.clone(),
            index,
            total,
        });
        reporter.info(format!("正在处理文件: {}", file));

        match process_file(input, options, &mut reporter) {
            Ok(FileOutcome::Completed {
                workbooks,
                archived_to,
            }) => {
                let summary = &mut reporter.summary;
                summary.processed += 1;
                summary.workbooks.extend(workbooks);
                summary.archived.push(archived_to);
                let processed = summary.processed;
                reporter.emit(ProcessEvent::Progress {
                    processed,
                    total,
                    percent: (processed * 100 / total) as u8,
                });
            }
            Ok(FileOutcome::Skipped) => reporter.summary.skipped += 1,
            Err(e) => {
                let message = format!("处理文件 {} 时出错: {}", file, e);
                tracing::error!(error = %e, "file failed");
                reporter.summary.failed += 1;
                reporter.summary.errors.push(message.clone());
                reporter.emit(ProcessEvent::FileFailed { file, message });
            }
        }
    }

    if reporter.summary.warnings.is_empty() {
        reporter.info("所有文件处理完成，没有发现警告信息。");
    } else {
        reporter.info("所有文件处理完成。以下是处理过程中的警告信息：");
        for message in reporter.summary.warnings.clone() {
            reporter.emit(ProcessEvent::Warning { message });
        }
    }
    reporter.emit(ProcessEvent::Progress {
        processed: reporter.summary.processed,
        total,
        percent: 100,
    });
    let summary = reporter.summary.clone();
    reporter.emit(ProcessEvent::Finished {
        summary: summary.clone(),
    });
    Ok(summary)
}
