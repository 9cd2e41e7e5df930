// src/db/monitoring.rs

use std::future::Future;
use std::time::Instant;
use log::debug;
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, TextEncoder, IntCounterVec, HistogramVec,
    register_int_counter_vec, register_histogram_vec,
};

/// Глобальные метрики для отслеживания операций с базой данных
pub static DB_QUERY_COUNTER: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "contacts_db_query_total",
        "Total number of contact store queries executed",
        &["operation"]
    ).expect("Failed to create DB_QUERY_COUNTER")
});

pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "contacts_db_query_duration_seconds",
        "Duration of contact store queries in seconds",
        &["operation"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    ).expect("Failed to create DB_QUERY_DURATION")
});

/// Счётчик записей импорта: outcome = imported | skipped
pub static IMPORT_RECORDS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "contacts_import_records_total",
        "Remote contact records processed by the import workflow",
        &["outcome"]
    ).expect("Failed to create IMPORT_RECORDS")
});

/// Обёртка для выполнения операции с базой и сбора метрик.
/// Результат (и ошибка) возвращаются как есть.
pub async fn measure_db_operation<F, T, E>(operation: &str, f: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    let start = Instant::now();
    let result = f.await;
    let secs = start.elapsed().as_secs_f64();

    DB_QUERY_COUNTER.with_label_values(&[operation]).inc();
    DB_QUERY_DURATION.with_label_values(&[operation]).observe(secs);

    debug!("DB operation {} took {:.4} seconds", operation, secs);
    result
}

pub fn record_import(imported: usize, skipped: usize) {
    IMPORT_RECORDS.with_label_values(&["imported"]).inc_by(imported as u64);
    IMPORT_RECORDS.with_label_values(&["skipped"]).inc_by(skipped as u64);
}

/// Экспорт метрик в текстовом формате Prometheus
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    // Трогаем Lazy, чтобы метрики были зарегистрированы даже до первого запроса
    Lazy::force(&DB_QUERY_COUNTER);
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&IMPORT_RECORDS);

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
