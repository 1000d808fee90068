/*!
 * Tests for file and directory utilities
 */

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;

use pdftrans::file_utils::FileManager;
use pdftrans::pdf::OutputVariant;

use crate::common;

#[test]
fn test_findPdfs_withFilesAndDirectories_shouldSortAndDeduplicate() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let b = common::create_test_file(dir.path(), "b.pdf", b"%PDF-1.5")?;
    let a = common::create_test_file(dir.path(), "a.pdf", b"%PDF-1.5")?;
    common::create_test_file(dir.path(), "b-dual.pdf", b"%PDF-1.5")?;

    let found = FileManager::find_pdfs(&[b.clone(), dir.path().to_path_buf()])?;

    assert_eq!(found, vec![a, b]);
    Ok(())
}

#[test]
fn test_findPdfs_withExplicitOutputFile_shouldKeepIt() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let output = common::create_test_file(dir.path(), "report-mono.pdf", b"%PDF-1.5")?;

    // Only directory walks skip our own outputs
    assert_eq!(FileManager::find_pdfs(&[output.clone()])?, vec![output]);
    Ok(())
}

#[test]
fn test_outputPath_withoutDirectory_shouldUseInputDirectory() {
    let input = PathBuf::from("papers/thesis.final.pdf");
    assert_eq!(
        FileManager::output_path(&input, None, OutputVariant::Mono),
        Path::new("papers").join("thesis.final-mono.pdf")
    );
}

#[test]
fn test_writeAtomic_withMissingParent_shouldCreateIt() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let target = dir.path().join("a").join("b").join("out-dual.pdf");

    FileManager::write_atomic(&target, b"%PDF-1.7")?;

    assert_eq!(fs::read(&target)?, b"%PDF-1.7");
    assert!(FileManager::is_pdf(&target));
    Ok(())
}
