//! Explain Command
//!
//! Explain one file, or every matching file in a directory.
//!
//! Usage:
//!   codexplain explain -i script.py -l Python
//!   codexplain explain -i code.js -l JavaScript -o explanation.md
//!   codexplain explain -i ./src -o ./explanations -l Python --pattern "*.py"
//!   codexplain explain -i code.py -l Python --provider ollama

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::cli::ui::Output;
use crate::config::ConfigLoader;
use crate::explainer::CodeExplainer;
use crate::types::{ExplainError, ExplainOutcome, ExplanationRequest, ExplanationResult, Result};

/// Options for the explain command
#[derive(Debug, Clone)]
pub struct ExplainOptions {
    pub input: PathBuf,
    pub language: String,
    pub output: Option<PathBuf>,
    /// Glob applied inside a directory input
    pub pattern: String,
    pub provider: Option<String>,
    pub show_metrics: bool,
    pub quiet: bool,
}

pub async fn run(options: ExplainOptions) -> Result<()> {
    let config = ConfigLoader::load()?;
    let explainer = CodeExplainer::from_config(&config)?;
    let output = Output::new().quiet(options.quiet);

    if options.input.is_file() {
        explain_file(&explainer, &output, &options).await
    } else if options.input.is_dir() {
        explain_directory(&explainer, &output, &options).await
    } else {
        Err(invalid_input(format!(
            "Input path does not exist: {}",
            options.input.display()
        )))
    }
}

async fn explain_file(
    explainer: &CodeExplainer,
    output: &Output,
    options: &ExplainOptions,
) -> Result<()> {
    let source = tokio::fs::read_to_string(&options.input).await?;

    output.header(&format!("Analyzing: {}", options.input.display()));
    output.info(&format!("Language: {}", options.language));
    println!();

    let request = build_request(source, options);
    let outcome = explainer
        .explain_streaming(&request, |text| output.stream(text))
        .await;
    println!();

    let result = finish(output, &options.input, outcome)?;

    if options.show_metrics {
        output.metrics(&result.provider, &result.model, &result.metrics);
    }

    if let Some(report_path) = &options.output {
        write_report(report_path, &options.input, &options.language, request.source(), &result)
            .await?;
        output.success(&format!("Explanation saved to: {}", report_path.display()));
    }

    Ok(())
}

async fn explain_directory(
    explainer: &CodeExplainer,
    output: &Output,
    options: &ExplainOptions,
) -> Result<()> {
    let Some(output_dir) = &options.output else {
        return Err(invalid_input(
            "--output is required for directory input".to_string(),
        ));
    };

    let files = matching_files(&options.input, &options.pattern)?;
    if files.is_empty() {
        output.warning(&format!(
            "No files matching pattern '{}' found in {}",
            options.pattern,
            options.input.display()
        ));
        return Ok(());
    }

    output.header(&format!("Found {} file(s) to explain", files.len()));
    tokio::fs::create_dir_all(output_dir).await?;

    let mut succeeded = 0usize;
    for file in &files {
        let report_path = output_dir.join(report_file_name(file));

        match explain_to_report(explainer, output, options, file, &report_path).await {
            Ok(()) => {
                succeeded += 1;
                output.success(&format!(
                    "{} → {}",
                    file.display(),
                    report_path.display()
                ));
            }
            Err(e) => output.error(&format!("{}: {}", file.display(), e)),
        }
    }

    info!(succeeded, total = files.len(), "Batch finished");
    println!();
    output.info(&format!(
        "Summary: {}/{} files explained successfully",
        succeeded,
        files.len()
    ));

    Ok(())
}

async fn explain_to_report(
    explainer: &CodeExplainer,
    output: &Output,
    options: &ExplainOptions,
    file: &Path,
    report_path: &Path,
) -> Result<()> {
    let source = tokio::fs::read_to_string(file).await?;
    let request = build_request(source, options);

    debug!(file = %file.display(), "Explaining");
    let outcome = explainer.explain(&request).await;
    let result = finish(output, file, outcome)?;

    write_report(report_path, file, &options.language, request.source(), &result).await
}

fn build_request(source: String, options: &ExplainOptions) -> ExplanationRequest {
    let request = ExplanationRequest::new(source, options.language.clone());
    match &options.provider {
        Some(provider) => request.with_provider(provider.clone()),
        None => request,
    }
}

/// Report failures before turning the outcome into a `Result`
fn finish(output: &Output, file: &Path, outcome: ExplainOutcome) -> Result<ExplanationResult> {
    match &outcome {
        ExplainOutcome::Rejected(rejection) => {
            output.error(&format!("{} rejected: {}", file.display(), rejection));
        }
        ExplainOutcome::Failed(failures) => {
            output.error(&format!(
                "No provider could explain {}",
                file.display()
            ));
            output.failures(failures);
        }
        ExplainOutcome::Done(_) => {}
    }
    outcome.into_result()
}

/// Files under `dir` matching `pattern`, sorted
fn matching_files(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full_pattern = format!(
        "{}/{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        pattern
    );
    let paths = glob::glob(&full_pattern)
        .map_err(|e| invalid_input(format!("Invalid pattern '{}': {}", pattern, e)))?;

    let mut files: Vec<PathBuf> = paths
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    Ok(files)
}

fn report_file_name(file: &Path) -> String {
    let stem = file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    format!("{}_explanation.md", stem)
}

/// Markdown report for one explained file
pub fn render_report(file: &Path, language: &str, source: &str, explanation: &str) -> String {
    format!(
        "# Code Explanation\n\n\
         **File:** {}\n\n\
         **Language:** {}\n\n\
         ## Original Code\n\n```{}\n{}\n```\n\n\
         ## Explanation\n\n{}\n",
        file.display(),
        language,
        language.trim().to_lowercase(),
        source,
        explanation
    )
}

async fn write_report(
    report_path: &Path,
    file: &Path,
    language: &str,
    source: &str,
    result: &ExplanationResult,
) -> Result<()> {
    if let Some(parent) = report_path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    let report = render_report(file, language, source, &result.explanation);
    tokio::fs::write(report_path, report).await?;
    Ok(())
}

fn invalid_input(message: String) -> ExplainError {
    ExplainError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_report() {
        let report = render_report(
            Path::new("src/add.py"),
            "Python",
            "def add(a, b):\n    return a + b",
            "Adds two numbers.",
        );

        assert!(report.starts_with("# Code Explanation\n\n"));
        assert!(report.contains("**File:** src/add.py"));
        assert!(report.contains("**Language:** Python"));
        assert!(report.contains("```python\ndef add(a, b):\n    return a + b\n```"));
        assert!(report.ends_with("## Explanation\n\nAdds two numbers.\n"));
    }

    #[test]
    fn test_report_file_name() {
        assert_eq!(report_file_name(Path::new("dir/main.rs")), "main_explanation.md");
        assert_eq!(report_file_name(Path::new("Makefile")), "Makefile_explanation.md");
    }

    #[test]
    fn test_matching_files() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("b.py"), "print(2)").unwrap();
        std::fs::write(temp_dir.path().join("a.py"), "print(1)").unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), "todo").unwrap();
        std::fs::create_dir(temp_dir.path().join("pkg.py")).unwrap();

        let files = matching_files(temp_dir.path(), "*.py").unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.py", "b.py"]);

        assert_eq!(matching_files(temp_dir.path(), "*").unwrap().len(), 3);
    }

    #[test]
    fn test_invalid_pattern() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matching_files(temp_dir.path(), "[").is_err());
    }
}
