// Sent by the runner presets. Accept-Encoding is left to the transport, which only advertises
// the decoders it was built with.
pub static DEFAULT_HEADERS: &'static [(&'static str, &'static str)] = &[
    ("accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.9"),
    ("accept-language", "en-US,en;q=0.9"),
    ("cache-control", "max-age=0"),
];
