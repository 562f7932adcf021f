use crate::calc;
use crate::fanout::NicFanout;
use crate::nics::NicKind;
use crate::schema::AllowList;
use crate::table::{Convert, Field, FieldKind, IdentityLabel, Layout, Property, StatTable};
use crate::EntityCollector;
use prism_client::{ApiVersion, PrismClient};
use prism_common::entity::str_field;
use prism_common::{Entity, MetricSink};
use std::sync::Arc;

fn vm_calculations(vm: &mut Entity) {
    calc::add_write_io_size(vm);
    calc::add_memory_stats(vm, &["memoryCapacityInBytes", "memory_capacity_in_bytes"]);
    calc::add_swap_rates(vm);
}

// v1 API: entity fields are camelCase, stat keys are not.
static VM_LAYOUT: Layout = Layout {
    namespace: "nutanix_vms",
    stat_maps: &["stats", "usageStats"],
    allow: AllowList::new(&[
        "hypervisor_cpu_usage_ppm",
        "hypervisor_memory_usage_ppm",
        "hypervisor_num_received_bytes",
        "hypervisor_num_transmitted_bytes",
        "controller_num_iops",
        "controller_num_read_iops",
        "controller_num_write_iops",
        "controller_io_bandwidth_kBps",
        "controller_avg_io_latency_usecs",
        "controller_avg_read_io_latency_usecs",
        "controller_avg_write_io_latency_usecs",
        "controller_total_io_size_kbytes",
        "controller_total_read_io_size_kbytes",
        "storage.capacity_bytes",
        "storage.usage_bytes",
        calc::TOTAL_WRITE_IO_SIZE,
        calc::MEMORY_USAGE_BYTES,
        calc::MEMORY_FREE_BYTES,
        calc::SWAP_IN_RATE_BYTES,
        calc::SWAP_OUT_RATE_BYTES,
    ]),
    identity: &[
        IdentityLabel::required("uuid", &["uuid"]),
        IdentityLabel::optional("host_uuid", &["hostUuid", "host_uuid"]),
    ],
    properties: &[
        Property::text("uuid"),
        Property::converted("host_uuid", "hostUuid", Convert::Text),
        Property::converted("name", "vmName", Convert::Text),
        Property::converted("host_name", "hostName", Convert::Text),
        Property::converted("power_state", "powerState", Convert::Text),
        Property::converted("controller_vm", "controllerVm", Convert::Text),
        Property::converted("num_vcpus", "numVCpus", Convert::Integer),
        Property::converted("memory_capacity_in_mb", "memoryCapacityInBytes", Convert::Scaled(1024.0 * 1024.0)),
        Property::converted("ip_addresses", "ipAddresses", Convert::Text),
    ],
    fields: &[
        Field::sourced("num_vcpus", &["numVCpus", "num_vcpus"], FieldKind::Number),
        Field::sourced(
            "memory_capacity_in_bytes",
            &["memoryCapacityInBytes", "memory_capacity_in_bytes"],
            FieldKind::Number,
        ),
        Field::sourced("power_state", &["powerState", "power_state"], FieldKind::Flag("on")),
    ],
    calculate: vm_calculations,
};

/// Virtual machines (v1 `vms/`, paged), optionally with their NICs.
pub struct VmsCollector {
    client: Arc<PrismClient>,
    table: StatTable,
    nics: Option<NicFanout>,
}

impl VmsCollector {
    pub fn new(client: Arc<PrismClient>, collect_nics: bool, max_parallel: usize) -> Self {
        Self {
            client,
            table: StatTable::new(&VM_LAYOUT),
            nics: collect_nics.then(|| NicFanout::new(NicKind::Vm, max_parallel)),
        }
    }
}

#[async_trait::async_trait]
impl EntityCollector for VmsCollector {
    fn name(&self) -> &str {
        "vms"
    }

    async fn describe(&mut self) -> prism_client::Result<()> {
        self.table.reset();
        let vms = self.client.fetch_all_pages(ApiVersion::V1, "vms", &[]).await?;
        tracing::debug!(vms = vms.len(), "VM discovery done");
        self.table.load(vms);

        if let Some(nics) = self.nics.as_mut() {
            let parents = self
                .table
                .entities()
                .iter()
                .filter_map(|vm| {
                    let uuid = str_field(vm, "uuid")?;
                    let name = str_field(vm, "vmName").unwrap_or_default();
                    Some((uuid.to_string(), name.to_string()))
                })
                .collect();
            nics.describe(&self.client, parents).await;
            tracing::debug!(vm_nic_collectors = nics.len(), "VM NIC discovery done");
        }
        Ok(())
    }

    fn collect(&self, sink: &mut MetricSink) {
        self.table.emit(sink);
        if let Some(nics) = &self.nics {
            nics.collect(sink);
        }
    }
}
