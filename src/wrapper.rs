#[cfg(feature = "log")]
pub mod rust_log {
    use crate::record::NormalizedRecord;
    use serde_json::Value;
    use std::panic::Location;

    /// Emit normalized records as key/values of a single log record.
    ///
    /// Each record is rendered as JSON; a missing record becomes `null`.
    pub fn log(
        level: log::Level,
        target: &str,
        module_path: &'static str,
        loc: &'static Location,
        records: Vec<(&'static str, Option<NormalizedRecord>)>,
    ) {
        let rendered: Vec<(&str, Option<Value>)> = records
            .into_iter()
            .map(|(key, record)| (key, record.map(Value::Object)))
            .collect();

        let kvs: Vec<(&str, log::kv::Value)> = rendered
            .iter()
            .map(|(key, value)| match value {
                Some(value) => (*key, log::kv::Value::from_display(value)),
                None => (*key, log::kv::Value::null()),
            })
            .collect();
        let kvs = kvs.as_slice();

        let mut builder = log::Record::builder();

        builder
            .args(format_args!("http message"))
            .level(level)
            .target(target)
            .module_path_static(Some(module_path))
            .file_static(Some(loc.file()))
            .line(Some(loc.line()))
            .key_values(&kvs);

        log::logger().log(&builder.build());
    }
}
