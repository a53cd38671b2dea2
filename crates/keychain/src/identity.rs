//! Cached identity metadata swap
//!
//! After a keychain swap the CLI would still report the old account's
//! identity, cached under `oauthAccount` in `<config_dir>/.claude.json`. These
//! functions copy that one field from source to target and leave every other
//! field of the target document alone.
//!
//! The keychain token is what authenticates; the identity document is only a
//! cache. A profile without one is skipped rather than treated as an error.

use std::fs;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::constants::IDENTITY_FIELD;
use crate::error::{Error, Result};
use crate::profile::Profile;

/// Copy the identity field from `source` into `target`.
///
/// Returns the target's previous value, `None` if the field was absent or if
/// either document does not exist (in which case nothing is written).
pub fn swap_identity_metadata(target: &Profile, source: &Profile) -> Result<Option<Value>> {
    let target_path = target.identity_path();
    let source_path = source.identity_path();

    for path in [&target_path, &source_path] {
        let exists = path
            .try_exists()
            .map_err(|e| Error::Io(format!("checking {}: {e}", path.display())))?;
        if !exists {
            debug!(path = %path.display(), "identity document missing, skipping swap");
            return Ok(None);
        }
    }

    let source_doc = read_document(&source_path)?;
    let mut target_doc = read_document(&target_path)?;

    let identity = source_doc.get(IDENTITY_FIELD).cloned().ok_or_else(|| {
        Error::IdentityMissingField(format!(
            "{} has no {IDENTITY_FIELD}",
            source_path.display()
        ))
    })?;

    let prior = target_doc.insert(IDENTITY_FIELD.to_string(), identity);
    write_document(&target_path, &target_doc)?;

    info!(
        target = %target_path.display(),
        source = %source_path.display(),
        "swapped identity metadata"
    );
    Ok(prior)
}

/// Put a previously returned identity value back into `target`. `None` is a no-op.
pub fn restore_identity_metadata(target: &Profile, prior: Option<&Value>) -> Result<()> {
    let Some(prior) = prior else {
        return Ok(());
    };

    let path = target.identity_path();
    let mut doc = read_document(&path)?;

    doc.insert(IDENTITY_FIELD.to_string(), prior.clone());
    write_document(&path, &doc)?;

    info!(target = %path.display(), "restored identity metadata");
    Ok(())
}

fn read_document(path: &Path) -> Result<Map<String, Value>> {
    let contents = fs::read_to_string(path)
        .map_err(|e| Error::Io(format!("reading {}: {e}", path.display())))?;
    serde_json::from_str(&contents)
        .map_err(|e| Error::IdentityParse(format!("parsing {}: {e}", path.display())))
}

/// Write a document atomically (temp file + rename) with 0600 permissions.
fn write_document(path: &Path, doc: &Map<String, Value>) -> Result<()> {
    let json = serde_json::to_string_pretty(doc)
        .map_err(|e| Error::IdentityParse(format!("serializing {}: {e}", path.display())))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("identity path has no parent directory".into()))?;
    let tmp_path = dir.join(format!(".claude.json.tmp.{}", std::process::id()));

    fs::write(&tmp_path, json.as_bytes())
        .map_err(|e| Error::Io(format!("writing temp identity file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))
            .map_err(|e| Error::Io(format!("setting identity file permissions: {e}")))?;
    }

    fs::rename(&tmp_path, path)
        .map_err(|e| Error::Io(format!("renaming temp identity file: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile_in(dir: &Path, name: &str) -> Profile {
        let config_dir = dir.join(name);
        fs::create_dir_all(&config_dir).unwrap();
        Profile::resolve_with_home(config_dir, None)
    }

    fn write_json(profile: &Profile, value: Value) {
        fs::write(profile.identity_path(), value.to_string()).unwrap();
    }

    fn read_json(profile: &Profile) -> Value {
        serde_json::from_str(&fs::read_to_string(profile.identity_path()).unwrap()).unwrap()
    }

    #[test]
    fn swap_copies_only_the_identity_field() {
        let dir = tempfile::tempdir().unwrap();
        let target = profile_in(dir.path(), "limited");
        let source = profile_in(dir.path(), "fresh");
        write_json(
            &target,
            json!({
                "oauthAccount": {"accountUuid": "old"},
                "projects": {"/repo": {}},
                "numStartups": 7
            }),
        );
        write_json(
            &source,
            json!({"oauthAccount": {"accountUuid": "new"}, "numStartups": 1}),
        );

        let prior = swap_identity_metadata(&target, &source).unwrap();

        assert_eq!(prior, Some(json!({"accountUuid": "old"})));
        let doc = read_json(&target);
        assert_eq!(doc["oauthAccount"]["accountUuid"], "new");
        assert_eq!(doc["numStartups"], 7);
        assert_eq!(doc["projects"], json!({"/repo": {}}));
    }

    #[test]
    fn swap_then_restore_returns_original_identity() {
        let dir = tempfile::tempdir().unwrap();
        let target = profile_in(dir.path(), "limited");
        let source = profile_in(dir.path(), "fresh");
        let original = json!({"oauthAccount": {"accountUuid": "old"}, "theme": "dark"});
        write_json(&target, original.clone());
        write_json(&source, json!({"oauthAccount": {"accountUuid": "new"}}));

        let prior = swap_identity_metadata(&target, &source).unwrap();
        restore_identity_metadata(&target, prior.as_ref()).unwrap();

        assert_eq!(read_json(&target), original);
    }

    #[test]
    fn missing_documents_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let target = profile_in(dir.path(), "limited");
        let source = profile_in(dir.path(), "fresh");

        assert_eq!(swap_identity_metadata(&target, &source).unwrap(), None);

        write_json(&source, json!({"oauthAccount": {}}));
        assert_eq!(swap_identity_metadata(&target, &source).unwrap(), None);
        assert!(!target.identity_path().exists());
    }

    #[test]
    fn source_without_field_errors() {
        let dir = tempfile::tempdir().unwrap();
        let target = profile_in(dir.path(), "limited");
        let source = profile_in(dir.path(), "fresh");
        write_json(&target, json!({"oauthAccount": {"accountUuid": "old"}}));
        write_json(&source, json!({"theme": "light"}));

        let err = swap_identity_metadata(&target, &source).unwrap_err();
        assert!(matches!(err, Error::IdentityMissingField(_)), "got: {err}");
        assert_eq!(read_json(&target)["oauthAccount"]["accountUuid"], "old");
    }

    #[test]
    fn unparseable_document_errors() {
        let dir = tempfile::tempdir().unwrap();
        let target = profile_in(dir.path(), "limited");
        let source = profile_in(dir.path(), "fresh");
        fs::write(target.identity_path(), "{not json").unwrap();
        write_json(&source, json!({"oauthAccount": {}}));

        let err = swap_identity_metadata(&target, &source).unwrap_err();
        assert!(matches!(err, Error::IdentityParse(_)), "got: {err}");
    }

    #[test]
    fn target_without_field_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let target = profile_in(dir.path(), "limited");
        let source = profile_in(dir.path(), "fresh");
        write_json(&target, json!({"theme": "dark"}));
        write_json(&source, json!({"oauthAccount": {"accountUuid": "new"}}));

        let prior = swap_identity_metadata(&target, &source).unwrap();

        assert_eq!(prior, None);
        assert_eq!(read_json(&target)["oauthAccount"]["accountUuid"], "new");
    }

    #[test]
    fn restore_none_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let target = profile_in(dir.path(), "limited");
        restore_identity_metadata(&target, None).unwrap();
        assert!(!target.identity_path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn swapped_document_is_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let target = profile_in(dir.path(), "limited");
        let source = profile_in(dir.path(), "fresh");
        write_json(&target, json!({"oauthAccount": {}}));
        write_json(&source, json!({"oauthAccount": {"accountUuid": "new"}}));

        swap_identity_metadata(&target, &source).unwrap();

        let mode = fs::metadata(target.identity_path()).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "identity file must be 0600, got {mode:o}");
    }
}
