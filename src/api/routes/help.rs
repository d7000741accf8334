//! Static usage text.

const HELP: &str = "\
blobcache - a server for caching files

  POST /products/<product>/<version>/<platform>/<key>
      Store the request body as a new cache entry.
      201 on success, 409 if the entry already exists.

  POST /products/<product>/<version>/<platform>/<key>/add_alias/<keyAlias>
      Create the alias <keyAlias> for an existing entry within the same
      product, version, and platform.
      201 on success, 409 if the source is absent or the alias exists.

  GET /products/<product>/<version>/<platform>/<key>
      Return the entry's payload as application/octet-stream and credit
      its usage. 404 if the entry is not present.

  GET /products/metadata
      Dump the cache index as JSON.

  GET /help
      This text.

Entries are evicted per (product, platform): at most 15 entries are kept,
and entries whose usage has decayed (half-life 7 days) are pruned hourly.
";

/// GET /help — static usage text.
pub async fn get_help() -> &'static str {
    HELP
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_help_mentions_every_route() {
        let text = get_help().await;
        assert!(text.contains("POST /products/"));
        assert!(text.contains("add_alias"));
        assert!(text.contains("GET /products/metadata"));
        assert!(text.contains("GET /help"));
    }
}
