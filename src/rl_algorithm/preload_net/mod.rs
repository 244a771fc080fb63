pub mod actor_critic;
