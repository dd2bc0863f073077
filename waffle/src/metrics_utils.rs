pub fn inc(name: &'static str, labels: &[(String, String)], value: u64) {
    let labels = labels.to_vec();
    metrics::counter!(name, &labels).increment(value);
}

pub fn kind_label(kind: impl ToString) -> (String, String) {
    ("kind".to_string(), kind.to_string())
}
