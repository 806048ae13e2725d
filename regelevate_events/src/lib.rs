// The build script copies events_template.rs here, with the real provider
// group GUID stitched in when one is supplied.
include!(concat!(env!("OUT_DIR"), "/mangled_events.rs"));
