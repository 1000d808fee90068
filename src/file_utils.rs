use anyhow::{Context, Result, anyhow};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::pdf::OutputVariant;

// @module: File and directory utilities

/// Leading bytes of every PDF file
const PDF_MAGIC: &[u8] = b"%PDF-";

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: File existence
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().is_file()
    }

    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            fs::create_dir_all(path)
                .with_context(|| format!("Failed to create directory: {}", path.display()))?;
        }
        Ok(())
    }

    /// Whether a file looks like a PDF, by extension or by its header
    pub fn is_pdf<P: AsRef<Path>>(path: P) -> bool {
        let path = path.as_ref();
        if !path.is_file() {
            return false;
        }
        if path
            .extension()
            .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("pdf"))
        {
            return true;
        }
        let mut header = [0u8; 5];
        fs::File::open(path)
            .and_then(|mut file| file.read_exact(&mut header))
            .is_ok_and(|_| header == PDF_MAGIC)
    }

    /// PDF files under the given paths; directories are walked recursively
    ///
    /// Results are sorted and deduplicated so batch runs are reproducible.
    pub fn find_pdfs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut result = Vec::new();
        for input in inputs {
            if input.is_file() {
                result.push(input.clone());
            } else if input.is_dir() {
                for entry in WalkDir::new(input).follow_links(true) {
                    let entry = entry.context("Failed to read directory entry")?;
                    let path = entry.path();
                    let is_pdf_name = path
                        .extension()
                        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("pdf"));
                    if path.is_file() && is_pdf_name && !Self::is_output_file(path) {
                        result.push(path.to_path_buf());
                    }
                }
            } else {
                return Err(anyhow!("Input path does not exist: {}", input.display()));
            }
        }
        result.sort();
        result.dedup();
        Ok(result)
    }

    /// Whether a file is one of our own outputs (`*-mono.pdf`, `*-dual.pdf`)
    pub fn is_output_file<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .file_stem()
            .map(|stem| stem.to_string_lossy())
            .is_some_and(|stem| stem.ends_with("-mono") || stem.ends_with("-dual"))
    }

    // @generates: Output path for one output variant
    // @params: input_file, output_dir (the input's directory when None), variant
    pub fn output_path<P: AsRef<Path>>(
        input_file: P,
        output_dir: Option<&Path>,
        variant: OutputVariant,
    ) -> PathBuf {
        Self::sibling_path(input_file.as_ref(), output_dir, |stem| format!("{}-{}.pdf", stem, variant))
    }

    /// Markdown export path (`<name>.md`) next to the other outputs
    pub fn markdown_path<P: AsRef<Path>>(input_file: P, output_dir: Option<&Path>) -> PathBuf {
        Self::sibling_path(input_file.as_ref(), output_dir, |stem| format!("{}.md", stem))
    }

    fn sibling_path(input_file: &Path, output_dir: Option<&Path>, name: impl Fn(&str) -> String) -> PathBuf {
        let stem = input_file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());
        let directory = output_dir
            .map(Path::to_path_buf)
            .or_else(|| input_file.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        directory.join(name(&stem))
    }

    /// Write bytes through a temporary file in the same directory, then rename
    ///
    /// Readers never see a partially written file.
    pub fn write_atomic<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
        let path = path.as_ref();
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self::ensure_dir(&parent)?;

        let mut temp = NamedTempFile::new_in(&parent)
            .with_context(|| format!("Failed to create temporary file in {}", parent.display()))?;
        temp.write_all(content)
            .with_context(|| format!("Failed to write temporary file for {}", path.display()))?;
        temp.as_file()
            .sync_all()
            .with_context(|| format!("Failed to flush temporary file for {}", path.display()))?;
        temp.persist(path)
            .map_err(|e| anyhow!("Failed to move output into place at {}: {}", path.display(), e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_outputPath_shouldUseStemAndVariant() {
        let mono = FileManager::output_path("/docs/paper.pdf", None, OutputVariant::Mono);
        assert_eq!(mono, PathBuf::from("/docs/paper-mono.pdf"));
        let dual = FileManager::output_path("/docs/paper.pdf", Some(Path::new("/out")), OutputVariant::Dual);
        assert_eq!(dual, PathBuf::from("/out/paper-dual.pdf"));
    }

    #[test]
    fn test_markdownPath_withOutputDir_shouldUseStem() {
        let markdown = FileManager::markdown_path("/docs/paper.pdf", Some(Path::new("/out")));
        assert_eq!(markdown, PathBuf::from("/out/paper.md"));
        assert_eq!(FileManager::markdown_path("/docs/paper.pdf", None), PathBuf::from("/docs/paper.md"));
    }

    #[test]
    fn test_findPdfs_shouldWalkDirectoriesAndSkipOutputs() -> Result<()> {
        let dir = TempDir::new()?;
        let nested = dir.path().join("nested");
        fs::create_dir(&nested)?;
        fs::write(dir.path().join("a.pdf"), b"%PDF-1.5")?;
        fs::write(nested.join("b.PDF"), b"%PDF-1.5")?;
        fs::write(dir.path().join("a-mono.pdf"), b"%PDF-1.5")?;
        fs::write(dir.path().join("notes.txt"), b"hello")?;

        let found = FileManager::find_pdfs(&[dir.path().to_path_buf()])?;
        let names: Vec<String> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.pdf", "b.PDF"]);
        Ok(())
    }

    #[test]
    fn test_findPdfs_withMissingInput_shouldFail() {
        let result = FileManager::find_pdfs(&[PathBuf::from("/definitely/not/here.pdf")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_writeAtomic_shouldReplaceExistingFile() -> Result<()> {
        let dir = TempDir::new()?;
        let target = dir.path().join("out").join("paper-mono.pdf");
        FileManager::write_atomic(&target, b"first")?;
        FileManager::write_atomic(&target, b"second")?;
        assert_eq!(fs::read(&target)?, b"second");
        assert_eq!(fs::read_dir(target.parent().unwrap())?.count(), 1);
        Ok(())
    }

    #[test]
    fn test_isPdf_shouldCheckHeaderWithoutExtension() -> Result<()> {
        let dir = TempDir::new()?;
        let file = dir.path().join("scan");
        fs::write(&file, b"%PDF-1.7 rest")?;
        assert!(FileManager::is_pdf(&file));
        fs::write(&file, b"GIF89a")?;
        assert!(!FileManager::is_pdf(&file));
        Ok(())
    }
}
