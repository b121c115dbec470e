//! Input-unit loading.
//!
//! Decodes every input object file into an independent set of per-file
//! tables. Offsets and addends are still relative to each file's own
//! section layout at this point.

use crate::obj::{read_object_file, ObjectData};

/// One decoded input file.
#[derive(Debug)]
pub struct Unit {
    pub file_name: String,
    pub data: ObjectData,
}

/// Load all input files, in command-line order.
pub fn load_units(paths: &[String]) -> Result<Vec<Unit>, String> {
    let mut units = Vec::with_capacity(paths.len());
    for path in paths {
        units.push(Unit {
            file_name: path.clone(),
            data: read_object_file(path)?,
        });
    }
    Ok(units)
}
