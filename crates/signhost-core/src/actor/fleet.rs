//! `FleetActor`: serialized front door to the fleet coordinator
//!
//! Quick roster operations run inside the handler; receives, backups,
//! restores and imports run on the blocking pool. Probes,
//! sweeps, pushes, pulls and discovery scans are detached onto a task
//! tracker and the reply returns as soon as they are started. Stopping the
//! actor cancels every detached scan and sweep.

use std::future::Future;
use std::sync::Arc;

use kameo::actor::{ActorRef, WeakActorRef};
use kameo::error::ActorStopReason;
use kameo::message::{Context, Message};
use kameo::prelude::*;
use signhost_api::responses::{BackupCreated, BackupInfo, ReceiveReport, VersionInfo};
use signhost_api::{Host, validate_ipv4};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::error::CoreError;
use crate::message::{
    AddHost, CreateBackup, EditHost, FleetStatus, GetHost, GetStatus, Identity, ImportSnapshot,
    ListBackups, ListRoster, ProbeHost, ProbeSweep, PullRoster, PushRoster, ReceiveRoster,
    RemoveHost, RestoreBackup, SelfDescription, SetPrimary, StartDiscovery,
};
use crate::sync::FleetSync;

/// Arguments for spawning a `FleetActor`
pub struct FleetActorArgs {
    pub sync: Arc<FleetSync>,
}

/// Fleet actor owning the coordinator and its background work
pub struct FleetActor {
    sync: Arc<FleetSync>,
    /// Parent of every detached scan and sweep
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl FleetActor {
    #[must_use]
    pub fn sync(&self) -> &Arc<FleetSync> {
        &self.sync
    }

    fn detach<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(task);
    }

}

/// Run a store-heavy operation on the blocking pool
async fn blocking<T, F>(sync: Arc<FleetSync>, op: F) -> Result<T, CoreError>
where
    F: FnOnce(&FleetSync) -> Result<T, CoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || op(&sync))
        .await
        .map_err(|e| CoreError::ActorError(format!("blocking task failed: {e}")))?
}

impl Actor for FleetActor {
    type Args = FleetActorArgs;
    type Error = CoreError;

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        info!(id = %actor_ref.id(), node = %args.sync.identity().id, "FleetActor starting");

        Ok(Self {
            sync: args.sync,
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
        })
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        info!(reason = ?reason, running = self.tasks.len(), "FleetActor stopping");
        self.cancel.cancel();
        self.tasks.close();
        Ok(())
    }
}

// ============================================================================
// Roster
// ============================================================================

impl Message<ListRoster> for FleetActor {
    type Reply = Result<Vec<Host>, CoreError>;

    async fn handle(
        &mut self,
        _msg: ListRoster,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        Ok(self.sync.list())
    }
}

impl Message<GetHost> for FleetActor {
    type Reply = Result<Host, CoreError>;

    async fn handle(&mut self, msg: GetHost, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        self.sync.get(&msg.ip)
    }
}

impl Message<AddHost> for FleetActor {
    type Reply = Result<Host, CoreError>;

    async fn handle(&mut self, msg: AddHost, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        let host = self.sync.add(msg.host)?;
        info!(host = %host.ip_address, id = %host.id, "host added");
        Ok(host)
    }
}

impl Message<EditHost> for FleetActor {
    type Reply = Result<Host, CoreError>;

    async fn handle(
        &mut self,
        msg: EditHost,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.sync.edit(&msg.ip, msg.edit)
    }
}

impl Message<RemoveHost> for FleetActor {
    type Reply = Result<Host, CoreError>;

    async fn handle(
        &mut self,
        msg: RemoveHost,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let host = self.sync.remove(&msg.ip)?;
        info!(host = %host.ip_address, "host removed");
        Ok(host)
    }
}

impl Message<SetPrimary> for FleetActor {
    type Reply = Result<Vec<Host>, CoreError>;

    async fn handle(
        &mut self,
        msg: SetPrimary,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.sync.set_primary(&msg.ip)
    }
}

// ============================================================================
// Background work
// ============================================================================

impl Message<ProbeHost> for FleetActor {
    type Reply = Result<(), CoreError>;

    async fn handle(
        &mut self,
        msg: ProbeHost,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let host = self.sync.get(&msg.ip)?;
        let sync = Arc::clone(&self.sync);
        self.detach(async move {
            if let Err(e) = sync.probe_host(&host.ip_address).await {
                warn!(host = %host.ip_address, error = %e, "probe failed");
            }
        });
        Ok(())
    }
}

impl Message<ProbeSweep> for FleetActor {
    type Reply = Result<(), CoreError>;

    async fn handle(
        &mut self,
        _msg: ProbeSweep,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let sync = Arc::clone(&self.sync);
        let cancel = self.cancel.child_token();
        self.detach(async move {
            if let Err(e) = sync.probe_sweep(&cancel).await {
                warn!(error = %e, "probe sweep failed");
            }
        });
        Ok(())
    }
}

impl Message<StartDiscovery> for FleetActor {
    type Reply = Result<(), CoreError>;

    async fn handle(
        &mut self,
        msg: StartDiscovery,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if let Some(addr) = &msg.interface_address {
            validate_ipv4(addr)?;
        }
        let sync = Arc::clone(&self.sync);
        let cancel = self.cancel.child_token();
        self.detach(async move {
            if let Err(e) = sync.discover(&cancel, msg.interface_address.as_deref()).await {
                warn!(error = %e, "discovery failed");
            }
        });
        Ok(())
    }
}

impl Message<PushRoster> for FleetActor {
    type Reply = Result<(), CoreError>;

    async fn handle(
        &mut self,
        msg: PushRoster,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let sync = Arc::clone(&self.sync);
        self.detach(async move {
            sync.push(msg.targets).await;
        });
        Ok(())
    }
}

impl Message<PullRoster> for FleetActor {
    type Reply = Result<(), CoreError>;

    async fn handle(
        &mut self,
        msg: PullRoster,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        validate_ipv4(&msg.peer)?;
        let sync = Arc::clone(&self.sync);
        self.detach(async move {
            if let Err(e) = sync.pull(&msg.peer).await {
                warn!(peer = %msg.peer, error = %e, "pull failed");
            }
        });
        Ok(())
    }
}

// ============================================================================
// Gossip receive and identity
// ============================================================================

impl Message<ReceiveRoster> for FleetActor {
    type Reply = Result<ReceiveReport, CoreError>;

    async fn handle(
        &mut self,
        msg: ReceiveRoster,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        blocking(Arc::clone(&self.sync), move |sync| {
            sync.receive(msg.hosts, msg.merge)
        })
        .await
    }
}

impl Message<SelfDescription> for FleetActor {
    type Reply = Result<Host, CoreError>;

    async fn handle(
        &mut self,
        _msg: SelfDescription,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        Ok(self.sync.self_record())
    }
}

impl Message<Identity> for FleetActor {
    type Reply = Result<VersionInfo, CoreError>;

    async fn handle(
        &mut self,
        _msg: Identity,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        Ok(self.sync.version_info())
    }
}

// ============================================================================
// Backups
// ============================================================================

impl Message<CreateBackup> for FleetActor {
    type Reply = Result<BackupCreated, CoreError>;

    async fn handle(
        &mut self,
        _msg: CreateBackup,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        blocking(Arc::clone(&self.sync), FleetSync::create_backup).await
    }
}

impl Message<ListBackups> for FleetActor {
    type Reply = Result<Vec<BackupInfo>, CoreError>;

    async fn handle(
        &mut self,
        _msg: ListBackups,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.sync.list_backups()
    }
}

impl Message<RestoreBackup> for FleetActor {
    type Reply = Result<BackupCreated, CoreError>;

    async fn handle(
        &mut self,
        msg: RestoreBackup,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let name = msg.name.clone();
        let created =
            blocking(Arc::clone(&self.sync), move |sync| sync.restore_backup(&name)).await?;
        info!(backup = %msg.name, "restored backup");
        Ok(created)
    }
}

impl Message<ImportSnapshot> for FleetActor {
    type Reply = Result<BackupCreated, CoreError>;

    async fn handle(
        &mut self,
        msg: ImportSnapshot,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        blocking(Arc::clone(&self.sync), move |sync| {
            sync.import_snapshot(&msg.bytes)
        })
        .await
    }
}

// ============================================================================
// Status
// ============================================================================

impl Message<GetStatus> for FleetActor {
    type Reply = FleetStatus;

    async fn handle(
        &mut self,
        _msg: GetStatus,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        FleetStatus {
            hosts: self.sync.store().len(),
            background_tasks: self.tasks.len(),
        }
    }
}
