//! Byte-identical canned protocol response bodies.

pub const CONTENT_TYPE_XML: &str = "text/xml";

pub const VERSION: &str = "<response>\r\n<returncode>SUCCESS</returncode>\r\n<version>2.0</version>\r\n<apiVersion>2.0</apiVersion>\r\n<bbbVersion/>\r\n</response>";

pub const CREATE_LIMIT_REACHED: &str = "<response>\r\n<returncode>FAILED</returncode>\r\n<message>Meeting/Attendee limit reached.</message>\r\n</response>";

pub const CREATE_NO_NODE_AVAILABLE: &str = "<response>\r\n<returncode>FAILED</returncode>\r\n<message>No Node available.</message>\r\n</response>";

pub const IS_MEETING_RUNNING_FALSE: &str = "<response>\r\n<returncode>SUCCESS</returncode>\r\n<running>false</running>\r\n</response>";

pub const GET_MEETING_INFO_FALSE: &str = "<response>\r\n<returncode>FAILED</returncode>\r\n<messageKey>notFound</messageKey>\r\n<message>A meeting with that ID does not exist</message>\r\n</response>";

pub const GET_MEETINGS_NO_MEETINGS: &str = "<response>\r\n<returncode>SUCCESS</returncode>\r\n<meetings/>\r\n<messageKey>noMeetings</messageKey>\r\n<message>no meetings were found on this server</message>\r\n</response>";

pub const GET_RECORDING_TEXT_TRACKS_NOTHING_FOUND_JSON: &str = "{\"response\":{\"returncode\":\"FAILED\",\"messageKey\":\"noRecordings\",\"message\":\"No recording found\"}}";

pub const GET_RECORDINGS_NO_RECORDINGS: &str = "<response>\r\n<returncode>SUCCESS</returncode>\r\n<recordings></recordings>\r\n<messageKey>noRecordings</messageKey>\r\n<message>There are no recordings for the meeting(s).</message>\r\n</response>";

pub const MISSING_MEETING_ID: &str = "<response>\r\n<returncode>FAILED</returncode>\r\n<messageKey>missingParamMeetingID</messageKey>\r\n<message>You must specify a meeting ID for the meeting.</message>\r\n</response>";

pub const MISSING_MEETING_ID_TOO_LONG: &str = "<response>\r\n<returncode>FAILED</returncode>\r\n<message>Meeting id must be between 2 and 100 characters</message>\r\n</response>";

pub const MISSING_RECORD_ID: &str = "<response>\r\n<returncode>FAILED</returncode>\r\n<messageKey>missingParamRecordID</messageKey>\r\n<message>You must specify one or more a record IDs.</message>\r\n</response>";

pub const MISSING_RECORD_PUBLISH: &str = "<response>\r\n<returncode>FAILED</returncode>\r\n<messageKey>missingParamPublish</messageKey>\r\n<message>You must specify one a publish value true or false.</message>\r\n</response>";

pub fn record_published(published: bool) -> String {
    format!(
        "<response>\r\n<returncode>SUCCESS</returncode>\r\n<published>{}</published>\r\n</response>",
        published
    )
}

pub const RECORD_DELETED: &str = "<response>\r\n<returncode>SUCCESS</returncode>\r\n<deleted>true</deleted>\r\n</response>";

pub const RECORD_UPDATED: &str = "<response>\r\n<returncode>SUCCESS</returncode>\r\n<updated>true</updated>\r\n</response>";

pub const WRONG_MEETING_NAME_LENGTH: &str = "<response>\r\n<returncode>FAILED</returncode>\r\n<messageKey>sizeError</messageKey>\r\n<message>Meeting name must be between 2 and 256 characters</message>\r\n</response>";

pub const MEETING_ID_LENGTH: usize = 100;
pub const MEETING_NAME_LENGTH: usize = 256;
pub const NONCE_LENGTH: usize = 64;

/// Inline slide injection size caps: decoded bytes must fit both, since a
/// base64 blob three-fourths the size of its source still has to round-trip
/// through the POST body.
pub const MAX_SLIDE_SIZE_IN_POST: usize = 768_000;
pub const MAX_BASE64_SLIDE_SIZE_IN_POST: usize = 1_024_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_published_renders_bool() {
        assert!(record_published(true).contains("<published>true</published>"));
        assert!(record_published(false).contains("<published>false</published>"));
    }
}
