//! Constants used throughout the PHCare core crate.

use std::time::Duration;

/// Key attribute of every patient record.
pub const PATIENT_ID_ATTRIBUTE: &str = "PatientID";

/// Attributes matched by the `q` substring search.
pub const FIRST_NAME_ATTRIBUTE: &str = "FirstName";
pub const LAST_NAME_ATTRIBUTE: &str = "LastName";

/// Root path of the patient collection.
pub const COLLECTION_ROOT: &str = "/patients";

/// Sub-resource segment for document upload links.
pub const DOCUMENTS_SEGMENT: &str = "documents";

/// Query parameter carrying the search substring.
pub const SEARCH_QUERY_PARAM: &str = "q";

/// Role required for every write operation unless overridden in configuration.
pub const DEFAULT_WRITE_ROLE: &str = "Doctor";

/// Default scope prefix of uploaded document keys.
pub const DEFAULT_UPLOAD_PREFIX: &str = "public";

/// Lifetime of an issued upload link.
pub const UPLOAD_LINK_TTL: Duration = Duration::from_secs(5 * 60);

/// Default directory for the local file-backed patient store.
pub const DEFAULT_PATIENT_DATA_DIR: &str = "patient_data";

/// Filename for patient JSON files in the local store.
pub const PATIENT_JSON_FILENAME: &str = "patient.json";

/// Default base URL of development upload links issued by the local backend.
pub const DEFAULT_LOCAL_UPLOAD_URL: &str = "http://localhost:3000/uploads";
