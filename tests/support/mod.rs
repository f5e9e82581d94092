pub mod helpers;
pub mod jobs;
pub mod mock_master;
