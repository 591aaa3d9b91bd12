use std::collections::HashMap;

use prometheus::Registry;

use crate::constants::DEFAULT_CLUSTER_ID;

pub const NAMESPACE: &str = "kmdr";

pub const LABEL_CLUSTER_ID: &str = "cluster_id";
pub const LABEL_AGGREGATION: &str = "aggregation";
pub const LABEL_TOPIC: &str = "topic";

/// Create the Prometheus Metrics [`Registry`] shared by the whole service.
///
/// All metrics are namespaced by [`NAMESPACE`], and carry the cluster identifier as default label.
///
/// # Arguments
///
/// * `cluster_id` - Identifier of the monitored cluster, if known
pub fn init(cluster_id: Option<String>) -> Registry {
    let prom_def_labels = HashMap::from([(
        LABEL_CLUSTER_ID.to_string(),
        cluster_id.unwrap_or_else(|| DEFAULT_CLUSTER_ID.to_string()),
    )]);

    info!("Prometheus Metrics default labels:\n{:#?}", prom_def_labels);

    Registry::new_custom(Some(NAMESPACE.to_string()), Some(prom_def_labels))
        .expect("Unable to create a Prometheus Metrics Registry")
}
