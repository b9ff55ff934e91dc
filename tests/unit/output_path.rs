//! Chunk path layout

use std::path::PathBuf;

use cimis_fetch::output::path::{station_dir, DataType};
use cimis_fetch::output::{ChunkPathBuilder, CsvChunkWriter};

#[test]
fn test_station_directory_is_zero_padded() {
    assert_eq!(
        station_dir(&PathBuf::from("data"), 2),
        PathBuf::from("data/stations/002")
    );
    assert_eq!(
        station_dir(&PathBuf::from("data"), 250),
        PathBuf::from("data/stations/250")
    );
}

#[test]
fn test_builder_and_writer_agree() {
    let root = PathBuf::from("/tmp/cimis");
    let built = ChunkPathBuilder::new(root.clone(), 80)
        .with_year(2022)
        .with_data_type(DataType::Daily)
        .build();
    assert_eq!(built, PathBuf::from("/tmp/cimis/stations/080/2022_daily.csv"));
    assert_eq!(CsvChunkWriter::new(root).chunk_path(80, 2022), built);
}

#[test]
fn test_data_type_name() {
    assert_eq!(DataType::Daily.as_str(), "daily");
    assert_eq!(DataType::Daily.to_string(), "daily");
}
