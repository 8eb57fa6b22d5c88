//! Linode Instance adapter

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use keel_common::crd::{Instance, InstanceDrift, InstanceObservation, InstanceParameters, PowerState};
use keel_common::Error;
use keel_provider::types::{
    self, CreateInstanceRequest, ResizeInstanceRequest, UpdateInstanceRequest,
};
use keel_provider::LinodeApi;
use kube::ResourceExt;
use rand::RngCore;
use tracing::{debug, info};

use crate::external::{ConnectionDetails, Creation, ExternalClient, UpdateOutcome};
use crate::kind::ManagedKind;

/// Random bytes behind a generated root password
const ROOT_PASS_BYTES: usize = 50;

/// Connection detail keys
pub const ROOT_PASS_KEY: &str = "rootPass";
/// First public IPv4 address
pub const IPV4_KEY: &str = "ipv4";
/// SLAAC IPv6 address
pub const IPV6_KEY: &str = "ipv6";

impl ManagedKind for Instance {
    type External = InstanceExternal;

    fn connect(api: Arc<dyn LinodeApi>) -> InstanceExternal {
        InstanceExternal { api }
    }
}

/// Instance calls over the Linode API
pub struct InstanceExternal {
    api: Arc<dyn LinodeApi>,
}

fn parse_id(external_name: &str) -> Result<u64, Error> {
    external_name
        .parse()
        .map_err(|_| Error::identity_mismatch("Instance", external_name, "id is not a number"))
}

fn observation(instance: types::Instance) -> InstanceObservation {
    InstanceObservation {
        id: instance.id,
        status: instance.status,
        label: instance.label,
        region: instance.region,
        instance_type: instance.instance_type,
        image: instance.image,
        ipv4: instance.ipv4,
        ipv6: instance.ipv6,
        tags: instance.tags,
        created: instance.created,
        updated: instance.updated,
    }
}

fn generate_root_pass() -> String {
    let mut bytes = [0u8; ROOT_PASS_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

#[async_trait]
impl ExternalClient<Instance> for InstanceExternal {
    async fn read(&self, external_name: &str) -> Result<InstanceObservation, Error> {
        let id = parse_id(external_name)?;
        let instance = self
            .api
            .get_instance(id)
            .await
            .map_err(|e| Error::provider("get instance", external_name, e))?;
        Ok(observation(instance))
    }

    async fn create(
        &self,
        record: &Instance,
        parameters: &InstanceParameters,
    ) -> Result<Creation<InstanceObservation>, Error> {
        // A root password only makes sense when an image is deployed
        let root_pass = parameters.image.as_ref().map(|_| generate_root_pass());

        let request = CreateInstanceRequest {
            region: parameters.region.clone(),
            instance_type: parameters.instance_type.clone(),
            label: parameters.label.clone(),
            image: parameters.image.clone(),
            root_pass: root_pass.clone(),
            authorized_users: parameters.authorized_users.clone(),
            tags: parameters.tags.clone(),
            booted: parameters.status == PowerState::Running,
        };
        let instance = self
            .api
            .create_instance(&request)
            .await
            .map_err(|e| Error::provider("create instance", record.name_any(), e))?;

        info!(record = %record.name_any(), id = instance.id, "created instance");

        let mut connection_details = ConnectionDetails::new();
        if let Some(pass) = root_pass {
            connection_details.insert(ROOT_PASS_KEY.to_string(), pass.into_bytes());
        }
        if let Some(ip) = instance.ipv4.first() {
            connection_details.insert(IPV4_KEY.to_string(), ip.clone().into_bytes());
        }
        if let Some(ip) = &instance.ipv6 {
            connection_details.insert(IPV6_KEY.to_string(), ip.clone().into_bytes());
        }

        Ok(Creation {
            external_name: instance.id.to_string(),
            observation: observation(instance),
            connection_details,
        })
    }

    async fn update(
        &self,
        external_name: &str,
        _desired: &InstanceParameters,
        observed: &InstanceObservation,
        drift: &[InstanceDrift],
    ) -> Result<UpdateOutcome, Error> {
        let id = parse_id(external_name)?;
        let mut outcome = UpdateOutcome::default();
        let mut failures = Vec::new();

        let mut request = UpdateInstanceRequest::default();
        let mut resize = None;
        let mut power = None;
        let mut settling = None;
        for d in drift {
            match d {
                InstanceDrift::Label(label) => request.label = Some(label.clone()),
                InstanceDrift::Tags(tags) => request.tags = Some(tags.clone()),
                InstanceDrift::Type(t) => resize = Some(t),
                InstanceDrift::Power(state) => power = Some(*state),
                InstanceDrift::TransitionPending(state) => settling = Some(state),
            }
        }

        if !request.is_empty() {
            match self.api.update_instance(id, &request).await {
                Ok(_) => {
                    if let Some(label) = &request.label {
                        outcome.applied(format!("label -> {label}"));
                    }
                    if request.tags.is_some() {
                        outcome.applied("tags");
                    }
                }
                Err(e) => failures.push(Error::provider("update instance", external_name, e)),
            }
        }

        if let Some(state) = settling {
            // Power and plan changes are rejected while the provider is busy
            if resize.is_some() || power.is_some() {
                debug!(id, state = %state, "deferring power and type changes");
                outcome.defer(format!("waiting for {state} to settle"));
            }
        } else if let Some(target) = resize {
            if observed.status == PowerState::Offline.as_str() {
                let request = ResizeInstanceRequest {
                    instance_type: target.clone(),
                    allow_auto_disk_resize: true,
                };
                match self.api.resize_instance(id, &request).await {
                    Ok(()) => outcome.applied(format!("resize -> {target}")),
                    Err(e) => failures.push(Error::provider("resize instance", external_name, e)),
                }
            } else {
                match self.api.shutdown_instance(id).await {
                    Ok(()) => {
                        outcome.applied("shutdown for resize");
                        outcome.defer(format!("resize -> {target}"));
                    }
                    Err(e) => failures.push(Error::provider("shutdown instance", external_name, e)),
                }
            }
        } else if let Some(state) = power {
            let result = match state {
                PowerState::Running => self.api.boot_instance(id).await,
                PowerState::Offline => self.api.shutdown_instance(id).await,
            };
            match result {
                Ok(()) => outcome.applied(format!("power -> {state}")),
                Err(e) => {
                    let op = match state {
                        PowerState::Running => "boot instance",
                        PowerState::Offline => "shutdown instance",
                    };
                    failures.push(Error::provider(op, external_name, e));
                }
            }
        }

        outcome.finish(external_name, failures)
    }

    async fn delete(&self, external_name: &str) -> Result<(), Error> {
        let id = parse_id(external_name)?;
        self.api
            .delete_instance(id)
            .await
            .map_err(|e| Error::provider("delete instance", external_name, e))
    }
}
