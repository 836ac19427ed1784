// doc constants
pub const DOC_ID: &str = "_id";
pub const DOC_SCHEMA: &str = "_schema";
pub const DOC_CREATION_TS: &str = "_creationTs";
pub const RESERVED_FIELDS: [&str; 3] = [DOC_ID, DOC_SCHEMA, DOC_CREATION_TS];

// query operators
pub const OP_SET: &str = "$set";
pub const OP_UNSET: &str = "$unset";
pub const OP_REGEX: &str = "$regex";
pub const OP_OPTIONS: &str = "$options";
pub const OP_ALL: &str = "$all";
pub const OP_ELEM_MATCH: &str = "$elemMatch";
pub const OP_EXISTS: &str = "$exists";
pub const OP_GTE: &str = "$gte";
pub const OP_LTE: &str = "$lte";
pub const OP_NE: &str = "$ne";
pub const OP_LT: &str = "$lt";
pub const OP_OR: &str = "$or";
pub const OP_NOT: &str = "$not";
pub const OP_TYPE: &str = "$type";

// pipeline stages
pub const STAGE_UNWIND: &str = "$unwind";
pub const STAGE_MATCH: &str = "$match";
pub const STAGE_SORT: &str = "$sort";
pub const STAGE_SKIP: &str = "$skip";
pub const STAGE_LIMIT: &str = "$limit";
pub const STAGE_COUNT: &str = "$count";
pub const COUNT_FIELD: &str = "count";

// regex
pub const CASE_INSENSITIVE: &str = "i";
pub const REGEX_DELIMITER: char = '/';

// page constants
pub const PAGE_OFFSET: &str = "offset";
pub const PAGE_TOTAL: &str = "total";

// event constants
pub const MIGRATION_EVENT: &str = "migration_event";

pub const FIELD_SEPARATOR: char = '.';
pub const DOCPERSIST_VERSION: &str = env!("CARGO_PKG_VERSION");
