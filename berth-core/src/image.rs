//! Image reference parsing
//!
//! Splits references like `registry.example.com:5000/team/app:1.2` into the
//! registry host, repository and tag or digest.

/// Registry host assumed when a reference names none
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Parsed container image reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry hostname (with port when given)
    pub registry: String,
    /// Repository path, including the registry when one was written
    pub repository: String,
    /// Tag, or digest (`sha256:...`) when the reference pins one
    pub tag: String,
}

impl ImageReference {
    pub fn parse(image: &str) -> Self {
        let (name, tag) = match image.split_once('@') {
            Some((name, digest)) => (name, digest.to_string()),
            None => {
                let last_slash = image.rfind('/').map(|i| i + 1).unwrap_or(0);
                match image[last_slash..].rfind(':') {
                    Some(i) => (
                        &image[..last_slash + i],
                        image[last_slash + i + 1..].to_string(),
                    ),
                    None => (image, "latest".to_string()),
                }
            }
        };

        let registry = match name.split_once('/') {
            Some((first, _))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                first.to_string()
            }
            _ => DEFAULT_REGISTRY.to_string(),
        };

        Self {
            registry,
            repository: name.to_string(),
            tag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_image() {
        let parsed = ImageReference::parse("alpine");
        assert_eq!(parsed.registry, "docker.io");
        assert_eq!(parsed.repository, "alpine");
        assert_eq!(parsed.tag, "latest");
    }

    #[test]
    fn test_hub_image_with_tag() {
        let parsed = ImageReference::parse("library/alpine:3.19");
        assert_eq!(parsed.registry, "docker.io");
        assert_eq!(parsed.repository, "library/alpine");
        assert_eq!(parsed.tag, "3.19");
    }

    #[test]
    fn test_registry_with_port() {
        let parsed = ImageReference::parse("registry.local:5000/team/app");
        assert_eq!(parsed.registry, "registry.local:5000");
        assert_eq!(parsed.repository, "registry.local:5000/team/app");
        assert_eq!(parsed.tag, "latest");
    }

    #[test]
    fn test_localhost_registry() {
        let parsed = ImageReference::parse("localhost/app:dev");
        assert_eq!(parsed.registry, "localhost");
        assert_eq!(parsed.tag, "dev");
    }

    #[test]
    fn test_digest() {
        let parsed = ImageReference::parse("quay.io/org/app@sha256:abc");
        assert_eq!(parsed.registry, "quay.io");
        assert_eq!(parsed.repository, "quay.io/org/app");
        assert_eq!(parsed.tag, "sha256:abc");
    }
}
