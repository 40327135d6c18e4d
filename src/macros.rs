macro_rules! emit {
    ($emitter:expr, $($format:tt)*) => {
        $emitter.push($crate::ir::Line::instruction(format!($($format)*)))
    };
}
