use std::path::PathBuf;

use anyhow::{Context, Result};

/// Name of the dotenv file for an optional environment.
pub fn env_file_name(env: Option<&str>) -> String {
    match env {
        Some(name) => format!(".env.{}", name),
        None => ".env".to_string(),
    }
}

/// Load the dotenv file from the current directory or the closest ancestor
/// that has one. Returns the loaded path.
///
/// A missing `.env` is fine since variables may come from the process
/// environment. A missing `.env.{ENV}` is an error because it was asked for.
pub fn load_dotenv_from_ancestors(env: Option<&str>) -> Result<Option<PathBuf>> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let file_name = env_file_name(env);

    let mut current = cwd.as_path();
    loop {
        let env_path = current.join(&file_name);
        if env_path.exists() {
            dotenvy::from_path(&env_path)
                .with_context(|| format!("Failed to load {}", env_path.display()))?;
            return Ok(Some(env_path));
        }

        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }

    if env.is_some() {
        anyhow::bail!(
            "No {} file found.\n\n\
            Searched from {} to filesystem root.",
            file_name,
            cwd.display()
        );
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_env_file_name() {
        assert_eq!(env_file_name(None), ".env");
        assert_eq!(env_file_name(Some("staging")), ".env.staging");
    }

    #[test]
    #[serial]
    fn test_load_dotenv_from_current_directory() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(".env"), "LITESYNC_TEST_CURRENT=hello").unwrap();

        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(temp_dir.path()).unwrap();
        std::env::remove_var("LITESYNC_TEST_CURRENT");

        let loaded = load_dotenv_from_ancestors(None).unwrap();
        assert!(loaded.is_some(), "Should find .env in current directory");
        assert_eq!(std::env::var("LITESYNC_TEST_CURRENT").unwrap(), "hello");

        std::env::set_current_dir(original_dir).unwrap();
        std::env::remove_var("LITESYNC_TEST_CURRENT");
    }

    #[test]
    #[serial]
    fn test_load_dotenv_from_grandparent_directory() {
        let grandparent_dir = TempDir::new().unwrap();
        let child_dir = grandparent_dir.path().join("parent").join("child");
        fs::create_dir_all(&child_dir).unwrap();
        fs::write(
            grandparent_dir.path().join(".env"),
            "LITESYNC_TEST_GRANDPARENT=nested",
        )
        .unwrap();

        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(&child_dir).unwrap();
        std::env::remove_var("LITESYNC_TEST_GRANDPARENT");

        let result = load_dotenv_from_ancestors(None);
        assert!(result.is_ok(), "Should find .env in grandparent directory");
        assert_eq!(
            std::env::var("LITESYNC_TEST_GRANDPARENT").unwrap(),
            "nested"
        );

        std::env::set_current_dir(original_dir).unwrap();
        std::env::remove_var("LITESYNC_TEST_GRANDPARENT");
    }

    #[test]
    #[serial]
    fn test_load_dotenv_prefers_closest_env_file() {
        let parent_dir = TempDir::new().unwrap();
        let child_dir = parent_dir.path().join("subdir");
        fs::create_dir(&child_dir).unwrap();
        fs::write(parent_dir.path().join(".env"), "LITESYNC_TEST_CLOSEST=parent").unwrap();
        fs::write(child_dir.join(".env"), "LITESYNC_TEST_CLOSEST=child").unwrap();

        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(&child_dir).unwrap();
        std::env::remove_var("LITESYNC_TEST_CLOSEST");

        load_dotenv_from_ancestors(None).unwrap();
        assert_eq!(std::env::var("LITESYNC_TEST_CLOSEST").unwrap(), "child");

        std::env::set_current_dir(original_dir).unwrap();
        std::env::remove_var("LITESYNC_TEST_CLOSEST");
    }

    #[test]
    #[serial]
    fn test_load_named_env_file() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(".env"), "LITESYNC_TEST_NAMED=default").unwrap();
        fs::write(
            temp_dir.path().join(".env.staging"),
            "LITESYNC_TEST_NAMED=staging",
        )
        .unwrap();

        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(temp_dir.path()).unwrap();
        std::env::remove_var("LITESYNC_TEST_NAMED");

        let loaded = load_dotenv_from_ancestors(Some("staging")).unwrap().unwrap();
        assert!(loaded.ends_with(".env.staging"));
        assert_eq!(std::env::var("LITESYNC_TEST_NAMED").unwrap(), "staging");

        std::env::set_current_dir(original_dir).unwrap();
        std::env::remove_var("LITESYNC_TEST_NAMED");
    }

    #[test]
    #[serial]
    fn test_missing_env_files() {
        let temp_dir = TempDir::new().unwrap();

        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(temp_dir.path()).unwrap();

        // Ancestors of a temp dir are not expected to carry .env.nonexistent.
        let result = load_dotenv_from_ancestors(Some("nonexistent"));
        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("No .env.nonexistent file found"));

        std::env::set_current_dir(original_dir).unwrap();
    }
}
