use depsweep_protocol::{ElmJson, ModuleDoc, PackageManifest, PackageName, TransportError, Version};

/// Decode the `/all-packages/since/<cursor>` payload.
///
/// The registry returns oldest-first; we reverse so the scheduler sees the
/// newest packages at the front of the cache. One malformed entry fails the
/// whole batch rather than being dropped silently.
pub fn decode_since_list(body: &str) -> Result<Vec<(PackageName, Version)>, TransportError> {
    let entries: Vec<String> =
        serde_json::from_str(body).map_err(|e| TransportError::BadBody(e.to_string()))?;

    let mut decoded = Vec::with_capacity(entries.len());
    for entry in &entries {
        let (name, version) = entry
            .split_once('@')
            .ok_or_else(|| TransportError::BadBody(format!("missing '@' in '{entry}'")))?;
        let name: PackageName = name
            .parse()
            .map_err(|e: String| TransportError::BadBody(e))?;
        let version: Version = version
            .parse()
            .map_err(|e: String| TransportError::BadBody(e))?;
        decoded.push((name, version));
    }

    decoded.reverse();
    Ok(decoded)
}

/// Decode an `elm.json` payload, insisting on the library shape.
pub fn decode_manifest(body: &str) -> Result<PackageManifest, TransportError> {
    let decoded = ElmJson::parse(body).map_err(|e| TransportError::BadBody(e.to_string()))?;
    decoded
        .into_package()
        .ok_or_else(|| TransportError::BadBody("manifest is application-typed".to_string()))
}

/// Decode a `docs.json` payload. Free-text comments are dropped during
/// deserialization, so the cached form is names and signatures only.
pub fn decode_module_docs(body: &str) -> Result<Vec<ModuleDoc>, TransportError> {
    serde_json::from_str(body).map_err(|e| TransportError::BadBody(e.to_string()))
}
