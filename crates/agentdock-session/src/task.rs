//! Async task lifecycle.
//!
//! Every spawned handler carries a [`TaskId`]. Its result is applied only if
//! that id is still the active one for its [`TaskKind`]; anything else is a
//! stale completion and gets dropped.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub u64);

#[derive(Debug, Default)]
pub struct TaskSeq {
    next: u64,
}

impl TaskSeq {
    pub fn next_id(&mut self) -> TaskId {
        let id = TaskId(self.next);
        self.next = self.next.wrapping_add(1);
        id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Login,
    Teardown,
    EmbeddedWallet,
    WalletActivation,
    Signing,
    ChainSwitch,
    Validation,
    /// Deadline for the wallet layer to catch up with a login.
    Convergence,
}

/// Task lifecycle state (mutated only by the reducer).
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskState {
    pub active: Option<TaskId>,
}

impl TaskState {
    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_active(&self, id: TaskId) -> bool {
        self.active == Some(id)
    }

    pub fn finish_if_active(&mut self, id: TaskId) -> bool {
        let ok = self.active == Some(id);
        if ok {
            self.active = None;
        }
        ok
    }

    pub fn clear(&mut self) {
        self.active = None;
    }
}

#[derive(Debug, Default)]
pub struct Tasks {
    seq: TaskSeq,
    pub login: TaskState,
    pub teardown: TaskState,
    pub embedded_wallet: TaskState,
    pub wallet_activation: TaskState,
    pub signing: TaskState,
    pub chain_switch: TaskState,
    pub validation: TaskState,
    pub convergence: TaskState,
}

impl Tasks {
    /// Starts a task of `kind`, superseding any active one.
    pub fn start(&mut self, kind: TaskKind) -> TaskId {
        let id = self.seq.next_id();
        self.state_mut(kind).active = Some(id);
        id
    }

    pub fn state(&self, kind: TaskKind) -> &TaskState {
        match kind {
            TaskKind::Login => &self.login,
            TaskKind::Teardown => &self.teardown,
            TaskKind::EmbeddedWallet => &self.embedded_wallet,
            TaskKind::WalletActivation => &self.wallet_activation,
            TaskKind::Signing => &self.signing,
            TaskKind::ChainSwitch => &self.chain_switch,
            TaskKind::Validation => &self.validation,
            TaskKind::Convergence => &self.convergence,
        }
    }

    pub fn state_mut(&mut self, kind: TaskKind) -> &mut TaskState {
        match kind {
            TaskKind::Login => &mut self.login,
            TaskKind::Teardown => &mut self.teardown,
            TaskKind::EmbeddedWallet => &mut self.embedded_wallet,
            TaskKind::WalletActivation => &mut self.wallet_activation,
            TaskKind::Signing => &mut self.signing,
            TaskKind::ChainSwitch => &mut self.chain_switch,
            TaskKind::Validation => &mut self.validation,
            TaskKind::Convergence => &mut self.convergence,
        }
    }

    pub fn is_running(&self, kind: TaskKind) -> bool {
        self.state(kind).is_running()
    }

    pub fn finish_if_active(&mut self, kind: TaskKind, id: TaskId) -> bool {
        self.state_mut(kind).finish_if_active(id)
    }

    pub fn is_any_running(&self) -> bool {
        self.login.is_running()
            || self.teardown.is_running()
            || self.embedded_wallet.is_running()
            || self.wallet_activation.is_running()
            || self.signing.is_running()
            || self.chain_switch.is_running()
            || self.validation.is_running()
            || self.convergence.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_superseded_task_is_stale() {
        let mut tasks = Tasks::default();
        let first = tasks.start(TaskKind::Login);
        let second = tasks.start(TaskKind::Login);

        assert!(!tasks.finish_if_active(TaskKind::Login, first));
        assert!(tasks.is_running(TaskKind::Login));
        assert!(tasks.finish_if_active(TaskKind::Login, second));
        assert!(!tasks.is_any_running());
    }

    #[test]
    fn test_ids_are_unique_across_kinds() {
        let mut tasks = Tasks::default();
        let a = tasks.start(TaskKind::Login);
        let b = tasks.start(TaskKind::Teardown);
        assert_ne!(a, b);
        assert!(!tasks.finish_if_active(TaskKind::Login, b));
    }
}
