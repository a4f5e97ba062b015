use crate::error::UploadError;
use crate::inventory::load_products;
use std::fs::create_dir_all;
use std::io::Write;
use std::path::Path;

fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Extension uploads must carry, with its leading dot (`.xlsx`).
///
/// Uploads are parsed with the reader picked for `data_path`, so only files of
/// the same type can replace it.
pub fn upload_extension(data_path: &Path) -> Option<String> {
    lowercase_extension(data_path).map(|ext| format!(".{}", ext))
}

/// Whether an uploaded file name has the same type as the inventory file.
pub fn matches_data_format(data_path: &Path, file_name: &str) -> bool {
    match lowercase_extension(data_path) {
        Some(expected) => lowercase_extension(Path::new(file_name)) == Some(expected),
        None => false,
    }
}

/// Replace the inventory file at `data_path` with `contents`.
///
/// The upload is written to a temporary file next to `data_path` and read
/// back as an inventory first; only a readable file is renamed over the old
/// one. The rename is atomic, so a concurrent `load_products` sees either the
/// old file or the new one, never a partial write.
///
/// Returns the number of products in the new inventory.
pub fn replace_inventory(data_path: &Path, contents: &[u8]) -> Result<usize, UploadError> {
    let dir = match data_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    create_dir_all(dir)?;

    // keep the extension so the loader picks the same reader as for the real file
    let suffix = upload_extension(data_path).unwrap_or_default();

    let mut file = tempfile::Builder::new()
        .prefix(".upload-")
        .suffix(&suffix)
        .tempfile_in(dir)?;
    file.write_all(contents)?;
    file.flush()?;

    let inventory = load_products(file.path())?;

    file.persist(data_path).map_err(|e| e.error)?;
    log::info!(
        "Replaced inventory at {} ({} products)",
        data_path.display(),
        inventory.len()
    );

    Ok(inventory.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn valid_upload_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("inventory.csv");

        let count = replace_inventory(&path, b"sku,name\nA1,Milk\nB2,Bread\n").unwrap();
        assert_eq!(count, 2);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "sku,name\nA1,Milk\nB2,Bread\n"
        );

        replace_inventory(&path, b"sku,name\nC3,Eggs\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "sku,name\nC3,Eggs\n");
    }

    #[test]
    fn upload_type_follows_data_file() {
        let xlsx = Path::new("data/inventory.xlsx");
        assert_eq!(upload_extension(xlsx).as_deref(), Some(".xlsx"));
        assert!(matches_data_format(xlsx, "Inventory.XLSX"));
        assert!(!matches_data_format(xlsx, "inv.csv"));
        assert!(!matches_data_format(xlsx, "inventory"));

        assert!(matches_data_format(Path::new("inventory.csv"), "weekly.csv"));
        assert!(!matches_data_format(Path::new("inventory"), "inventory"));
        assert_eq!(upload_extension(Path::new("inventory")), None);
    }

    #[test]
    fn unreadable_upload_keeps_old_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.xlsx");
        fs::write(&path, b"old").unwrap();

        let result = replace_inventory(&path, b"this is not a workbook");
        assert!(matches!(result, Err(UploadError::Invalid(_))));
        assert_eq!(fs::read(&path).unwrap(), b"old");

        // no stray temporary files left behind
        let entries = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }
}
