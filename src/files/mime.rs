//! Extension → content-type registry for the file handlers.

use std::collections::HashMap;

/// Built-in content types keyed by lowercase extension (no dot).
pub fn default_content_types() -> HashMap<String, String> {
    [
        // --- Web & Text ---
        ("html", "text/html; charset=utf-8"),
        ("htm", "text/html; charset=utf-8"),
        ("css", "text/css; charset=utf-8"),
        ("js", "text/javascript; charset=utf-8"),
        ("mjs", "text/javascript; charset=utf-8"),
        ("json", "application/json"),
        ("map", "application/json"),
        ("xml", "application/xml"),
        ("csv", "text/csv"),
        ("txt", "text/plain; charset=utf-8"),
        ("md", "text/markdown"),
        ("wasm", "application/wasm"),
        ("webmanifest", "application/manifest+json"),

        // --- Images ---
        ("png", "image/png"),
        ("jpg", "image/jpeg"),
        ("jpeg", "image/jpeg"),
        ("gif", "image/gif"),
        ("webp", "image/webp"),
        ("avif", "image/avif"),
        ("svg", "image/svg+xml"),
        ("ico", "image/x-icon"),
        ("bmp", "image/bmp"),

        // --- Fonts ---
        ("woff", "font/woff"),
        ("woff2", "font/woff2"),
        ("ttf", "font/ttf"),
        ("otf", "font/otf"),

        // --- Audio & Video ---
        ("mp3", "audio/mpeg"),
        ("wav", "audio/wav"),
        ("ogg", "audio/ogg"),
        ("mp4", "video/mp4"),
        ("webm", "video/webm"),

        // --- Documents & Archives ---
        ("pdf", "application/pdf"),
        ("zip", "application/zip"),
        ("gz", "application/gzip"),
        ("tar", "application/x-tar"),
    ]
    .into_iter()
    .map(|(ext, ct)| (ext.to_owned(), ct.to_owned()))
    .collect()
}
