use std::io::Write;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // For each hid.bin file in our tests/data directory, create one basic test function
    // that parses, analyzes and re-serializes that report descriptor
    let datadir: PathBuf = [concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data")].iter().collect();
    println!("cargo:rerun-if-changed={}", datadir.display());

    let out_dir = std::env::var_os("OUT_DIR").ok_or("OUT_DIR is not set")?;
    let dest_path = PathBuf::from(&out_dir).join("test-report-descriptors.rs");
    let mut file = std::fs::File::create(dest_path)?;

    writeln!(file, "use hidcodec::*;")?;
    writeln!(file)?;

    let mut entries: Vec<_> = std::fs::read_dir(datadir)?.flatten().collect();
    entries.sort_by_key(|e| e.file_name());

    for rdesc in entries {
        let filename = rdesc.file_name().into_string().map_err(|_| "non-UTF8 file name")?;
        if !filename.ends_with(".hid.bin") {
            continue;
        }
        let funcname = filename.replace([':', '.', '-'], "_");
        let path = rdesc.path();
        writeln!(
            file,
            "
#[test]
#[allow(non_snake_case)]
fn test_{funcname}() {{
    let bytes: Vec<u8> = std::fs::read({path:?}).unwrap();
    if !bytes.is_empty() {{
        let rdesc = ReportDescriptor::try_from(bytes.as_slice())
            .unwrap_or_else(|e| panic!(\"Failed to parse {filename}: {{e}}\"));
        assert_eq!(rdesc.bytes(), bytes.as_slice(), \"{filename} does not re-serialize\");
        let layout = analyze(&rdesc)
            .unwrap_or_else(|e| panic!(\"Failed to analyze {filename}: {{e}}\"));
        assert!(!layout.is_empty(), \"{filename} has no fields\");
    }}
}}
"
        )?;
    }

    Ok(())
}
