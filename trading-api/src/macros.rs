/// Exposes a plugin crate's strategy through a uniform `entry_point` constructor.
#[macro_export]
macro_rules! export_strategy {
    ($strategy_type:ty) => {
        pub fn entry_point() -> Box<dyn $crate::Strategy> {
            Box::new(<$strategy_type>::default())
        }
    };
}
