use embed_manifest::embed_manifest_file;
use {
    std::{env, fs, io},
    winres::WindowsResource,
};

/// Builds a STRINGTABLE out of the `IDS_FOO = 1234, "text";` entries in
/// src/r.rs. That file is the only place the IDs and the English strings are
/// written down, so the two can't drift apart.
fn string_table(source: &str) -> String {
    let mut rc = String::from("STRINGTABLE\nBEGIN\n");
    for line in source.lines() {
        let line = line.trim();
        let Some((name, rest)) = line.split_once(" = ") else {
            continue;
        };
        if !name.starts_with("IDS_") {
            continue;
        }
        let Some((id, text)) = rest.split_once(", ") else {
            continue;
        };
        let text = text.trim_end_matches(';').trim();
        let text = text
            .strip_prefix('"')
            .and_then(|t| t.strip_suffix('"'))
            .unwrap_or(text);
        // Rust escapes a quote with a backslash, rc doubles it.
        let text = text.replace("\\\"", "\"\"");
        rc.push_str(&format!("    {id} \"{text}\"\n"));
    }
    rc.push_str("END\n");
    rc
}

fn main() -> io::Result<()> {
    println!("cargo:rerun-if-changed=src/r.rs");
    println!("cargo:rerun-if-changed=regelevate.manifest");

    if env::var_os("CARGO_CFG_WINDOWS").is_some() {
        embed_manifest_file("regelevate.manifest").expect("Failed to embed manifest");

        let resource_source = fs::read_to_string("src/r.rs")?;
        WindowsResource::new()
            // We don't want to use set_resource_file here, because we _do_ want
            // the file version info that winres can autogenerate. Instead,
            // stitch our string table onto what it generates.
            .append_rc_content(&string_table(&resource_source))
            .compile()?;
    }
    Ok(())
}
