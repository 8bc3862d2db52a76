pub mod archive;

pub use archive::{archive_file_name, create_archive_schema, ArchiveWriter, ArchivedObservation};
