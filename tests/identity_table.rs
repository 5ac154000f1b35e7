use anyhow::Result;
use piccord_watermark::IdentityTable;
use std::path::PathBuf;

fn table_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("piccord_{}_{}.bin", name, std::process::id()))
}

#[test]
fn table_survives_save_and_load() -> Result<()> {
    let path = table_path("persist");
    let _ = std::fs::remove_file(&path);

    let mut table = IdentityTable::new();
    let alice = table.get_or_allocate("152030987654321000")?;
    let bob = table.get_or_allocate("152030987654321001")?;
    let carol = table.get_or_allocate("152030987654321002")?;
    table.release(bob);
    table.save(&path)?;

    let mut loaded = IdentityTable::load(&path)?;
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded.internal_id("152030987654321000"), Some(alice));
    assert_eq!(loaded.external_id(carol), Some("152030987654321002"));
    assert_eq!(loaded.external_id(bob), None);

    // The freed slot is handed out again after reload.
    assert_eq!(loaded.get_or_allocate("152030987654321003")?, bob);

    std::fs::remove_file(&path)?;
    Ok(())
}

#[test]
fn missing_file_is_empty_table() -> Result<()> {
    let path = table_path("missing");
    let _ = std::fs::remove_file(&path);
    let table = IdentityTable::load(&path)?;
    assert!(table.is_empty());
    Ok(())
}

#[test]
fn garbage_file_is_an_error() -> Result<()> {
    let path = table_path("garbage");
    std::fs::write(&path, [0xff; 7])?;
    assert!(IdentityTable::load(&path).is_err());
    std::fs::remove_file(&path)?;
    Ok(())
}
