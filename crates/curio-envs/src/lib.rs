//! Built-in environments for curio.
//!
//! Provides simple discrete-action environments for testing and benchmarking:
//! - `Bandit` - Multi-armed bandit
//! - `CartPole` - Classic control
//! - `Corridor` - Sparse-reward chain, a small exploration benchmark

mod bandit;
mod cartpole;
mod corridor;

pub use bandit::Bandit;
pub use cartpole::CartPole;
pub use corridor::Corridor;

/// Names accepted by [`make`]
pub const ENV_NAMES: [&str; 3] = ["cartpole", "bandit", "corridor"];

/// A boxed environment chosen by name
pub type BoxedEnv = Box<dyn curio::env::Env>;

fn cartpole() -> BoxedEnv {
    Box::new(CartPole::new())
}

fn bandit() -> BoxedEnv {
    Box::new(Bandit::new(4))
}

fn corridor() -> BoxedEnv {
    Box::new(Corridor::new(10))
}

/// Constructor for the environment called `name`
pub fn creator(name: &str) -> Option<fn() -> BoxedEnv> {
    let create: fn() -> BoxedEnv = match name {
        "cartpole" => cartpole,
        "bandit" => bandit,
        "corridor" => corridor,
        _ => return None,
    };
    Some(create)
}

/// Build an environment by name, or `None` if the name is unknown
pub fn make(name: &str) -> Option<BoxedEnv> {
    creator(name).map(|create| create())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_known_names() {
        for name in ENV_NAMES {
            let env = make(name).unwrap();
            assert!(env.num_actions() >= 2, "{}", name);
        }
        assert!(make("pong").is_none());
    }
}
