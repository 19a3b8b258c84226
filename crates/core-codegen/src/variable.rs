//! Injected state variables and their C declarations.

/// Name of the per-bug state instance packing all of that bug's variables.
pub fn state_name(bug_id: u32) -> String {
    format!("rb_state{bug_id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Normal,
    Lock,
    CondVar,
}

impl VarKind {
    pub fn name_prefix(self) -> &'static str {
        match self {
            VarKind::Normal => "var",
            VarKind::Lock => "lock",
            VarKind::CondVar => "cv",
        }
    }

    pub fn c_type(self) -> &'static str {
        match self {
            VarKind::Normal => "uint32_t",
            VarKind::Lock => "pthread_mutex_t",
            VarKind::CondVar => "pthread_cond_t",
        }
    }

    /// Normal variables are racy by construction and must stay `volatile`.
    pub fn c_attribute(self) -> &'static str {
        match self {
            VarKind::Normal => "volatile",
            VarKind::Lock | VarKind::CondVar => "",
        }
    }

    pub fn c_initializer(self) -> &'static str {
        match self {
            VarKind::Normal => "0",
            VarKind::Lock => "PTHREAD_MUTEX_INITIALIZER",
            VarKind::CondVar => "PTHREAD_COND_INITIALIZER",
        }
    }
}

/// A typed state variable. `name` is the full C lvalue
/// (`rb_state<bug>.<prefix>_<n>`); `base_name` is the struct field.
#[derive(Debug, Clone)]
pub struct Variable {
    pub kind: VarKind,
    pub name: String,
}

impl Variable {
    pub fn new(kind: VarKind, bug_id: u32, suffix: usize) -> Self {
        let name = format!(
            "{}.{}_{}",
            state_name(bug_id),
            kind.name_prefix(),
            suffix
        );
        Self { kind, name }
    }

    pub fn base_name(&self) -> &str {
        self.name
            .split_once('.')
            .map(|(_, field)| field)
            .unwrap_or(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_the_state_struct_layout() {
        let v = Variable::new(VarKind::Normal, 2, 5);
        assert_eq!(v.name, "rb_state2.var_5");
        assert_eq!(v.base_name(), "var_5");
        let l = Variable::new(VarKind::Lock, 0, 1);
        assert_eq!(l.name, "rb_state0.lock_1");
        let c = Variable::new(VarKind::CondVar, 1, 0);
        assert_eq!(c.name, "rb_state1.cv_0");
    }
}
