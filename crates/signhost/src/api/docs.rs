//! OpenAPI document

use signhost_api::requests::{DiscoveryRequest, EditHostRequest, PullRequest, PushRequest};
use signhost_api::responses::{
    Accepted, BackupCreated, BackupInfo, HealthResponse, ReceiveReport, VersionInfo,
};
use signhost_api::{CmsStatus, Host, HostStatus, RosterEvent};
use utoipa::OpenApi;

use crate::api::{backups, error::ApiError, fleet, hosts, system, ws};

#[derive(OpenApi)]
#[openapi(
    info(title = "signhost", description = "Signage fleet roster daemon"),
    paths(
        system::health,
        system::self_description,
        system::version,
        hosts::list_hosts,
        hosts::add_host,
        hosts::get_host,
        hosts::edit_host,
        hosts::delete_host,
        hosts::set_primary,
        hosts::probe_host,
        hosts::probe_all,
        fleet::start_discovery,
        fleet::push,
        fleet::pull,
        fleet::receive,
        backups::list_backups,
        backups::create_backup,
        backups::restore_backup,
        backups::import_snapshot,
        backups::snapshot,
        ws::events,
    ),
    components(schemas(
        Host,
        HostStatus,
        CmsStatus,
        RosterEvent,
        EditHostRequest,
        DiscoveryRequest,
        PushRequest,
        PullRequest,
        HealthResponse,
        VersionInfo,
        ReceiveReport,
        BackupInfo,
        BackupCreated,
        Accepted,
        ApiError,
    )),
    tags(
        (name = "system", description = "Health and node identity"),
        (name = "hosts", description = "Roster and probing"),
        (name = "fleet", description = "Discovery and gossip between peers"),
        (name = "backups", description = "Store backups and snapshots"),
        (name = "events", description = "Roster change notifications"),
    )
)]
pub struct ApiDoc;
