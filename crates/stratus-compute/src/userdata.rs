//! Instance user data.
//!
//! The provider caps user data well below the size of a bootstrap payload,
//! so user data only installs a watcher that applies the payload once the
//! engine copies it onto the instance.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use stratus_common::{Error, Result};

const TEMPLATE: &str = include_str!("../templates/userdata.sh.j2");

/// Placeholder in the bootstrap payload replaced by the instance id
const DEFAULT_HOSTNAME: &str = "{{ ds.meta_data.hostname }}";

/// Render the user data script for an instance
pub fn render(instance_id: &str, bootstrap_destination: &str) -> Result<String> {
    let path = Path::new(bootstrap_destination);
    let (dir, file) = match (path.parent(), path.file_name()) {
        (Some(dir), Some(file)) => (dir.to_string_lossy(), file.to_string_lossy()),
        _ => {
            return Err(Error::validation_for_field(
                "engine config",
                "bootstrap.destination",
                format!("{:?} has no file name", bootstrap_destination),
            ))
        }
    };

    let mut env = minijinja::Environment::new();
    env.add_template("userdata", TEMPLATE)
        .map_err(|e| Error::internal_with_context("userdata", format!("invalid template: {}", e)))?;

    let ctx = minijinja::context! {
        instance_id => instance_id,
        bootstrap_dir => dir,
        bootstrap_file => file,
        default_hostname => DEFAULT_HOSTNAME,
    };

    env.get_template("userdata")
        .map_err(|e| Error::internal_with_context("userdata", format!("template not found: {}", e)))?
        .render(ctx)
        .map_err(|e| Error::internal_with_context("userdata", format!("failed to render: {}", e)))
}

/// Render and base64-encode the user data for a create request
pub fn encoded(instance_id: &str, bootstrap_destination: &str) -> Result<String> {
    Ok(STANDARD.encode(render(instance_id, bootstrap_destination)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_instance_and_paths() {
        let script = render("0123456789abcde", "/root/bootstrap.cfg").unwrap();
        assert!(script.starts_with("#!/bin/bash"));
        assert!(script.contains("Instance 0123456789abcde"));
        assert!(script.contains("inotifywait -e CREATE,MODIFY -m /root"));
        assert!(script.contains(r#"= "bootstrap.cfg""#));
        assert!(script.contains("'{{ ds.meta_data.hostname }}'/0123456789abcde/"));
    }

    #[test]
    fn test_encoded_is_base64_of_rendered() {
        let encoded = encoded("abc", "/root/bootstrap.cfg").unwrap();
        let decoded = STANDARD.decode(encoded).unwrap();
        assert_eq!(
            String::from_utf8(decoded).unwrap(),
            render("abc", "/root/bootstrap.cfg").unwrap()
        );
    }

    #[test]
    fn test_destination_without_file_name_rejected() {
        assert!(render("abc", "/").is_err());
    }
}
