/// Call counters for the rasterization hot paths
/// Incremented through `count_call!` / `count_add!`, which compile to nothing
/// unless the `profiling` feature is enabled
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe performance counters for function call tracking
pub struct FunctionCounters {
    // Pipeline counters
    pub draw_calls: AtomicU64,
    pub vertex_invocations: AtomicU64,
    pub primitives_assembled: AtomicU64,
    pub primitives_culled: AtomicU64,

    // Rasterization counters
    pub rasterize_triangle_calls: AtomicU64,
    pub hiz_rejected_triangles: AtomicU64,
    pub bvh_nodes_visited: AtomicU64,
    pub scanline_rows: AtomicU64,

    // Pixel counters
    pub pixels_tested: AtomicU64,
    pub depth_test_passed: AtomicU64,
    pub depth_test_failed: AtomicU64,
}

impl FunctionCounters {
    pub const fn new() -> Self {
        Self {
            draw_calls: AtomicU64::new(0),
            vertex_invocations: AtomicU64::new(0),
            primitives_assembled: AtomicU64::new(0),
            primitives_culled: AtomicU64::new(0),
            rasterize_triangle_calls: AtomicU64::new(0),
            hiz_rejected_triangles: AtomicU64::new(0),
            bvh_nodes_visited: AtomicU64::new(0),
            scanline_rows: AtomicU64::new(0),
            pixels_tested: AtomicU64::new(0),
            depth_test_passed: AtomicU64::new(0),
            depth_test_failed: AtomicU64::new(0),
        }
    }

    fn all(&self) -> [&AtomicU64; 11] {
        [
            &self.draw_calls,
            &self.vertex_invocations,
            &self.primitives_assembled,
            &self.primitives_culled,
            &self.rasterize_triangle_calls,
            &self.hiz_rejected_triangles,
            &self.bvh_nodes_visited,
            &self.scanline_rows,
            &self.pixels_tested,
            &self.depth_test_passed,
            &self.depth_test_failed,
        ]
    }

    /// Reset all counters to zero
    pub fn reset(&self) {
        for counter in self.all() {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> CounterSnapshot {
        let [draw_calls, vertex_invocations, primitives_assembled, primitives_culled, rasterize_triangle_calls, hiz_rejected_triangles, bvh_nodes_visited, scanline_rows, pixels_tested, depth_test_passed, depth_test_failed] =
            self.all().map(|c| c.load(Ordering::Relaxed));
        CounterSnapshot {
            draw_calls,
            vertex_invocations,
            primitives_assembled,
            primitives_culled,
            rasterize_triangle_calls,
            hiz_rejected_triangles,
            bvh_nodes_visited,
            scanline_rows,
            pixels_tested,
            depth_test_passed,
            depth_test_failed,
        }
    }
}

impl Default for FunctionCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of counter values at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub draw_calls: u64,
    pub vertex_invocations: u64,
    pub primitives_assembled: u64,
    pub primitives_culled: u64,
    pub rasterize_triangle_calls: u64,
    pub hiz_rejected_triangles: u64,
    pub bvh_nodes_visited: u64,
    pub scanline_rows: u64,
    pub pixels_tested: u64,
    pub depth_test_passed: u64,
    pub depth_test_failed: u64,
}

impl CounterSnapshot {
    /// Print formatted report
    pub fn print_report(&self) {
        println!("\n=== Performance Counters Report ===");
        println!("\nPipeline:");
        println!("  draw calls:                 {:12}", self.draw_calls);
        println!("  vertex invocations:         {:12}", self.vertex_invocations);
        println!("  primitives assembled:       {:12}", self.primitives_assembled);
        println!("  primitives culled:          {:12}", self.primitives_culled);

        println!("\nRasterization:");
        println!("  rasterize_triangle calls:   {:12}", self.rasterize_triangle_calls);
        println!("  Hi-Z rejected triangles:    {:12}", self.hiz_rejected_triangles);
        println!("  BVH nodes visited:          {:12}", self.bvh_nodes_visited);
        println!("  scanline rows swept:        {:12}", self.scanline_rows);

        println!("\nPixel Operations:");
        println!("  pixels tested:              {:12}", self.pixels_tested);
        println!("  depth test passed:          {:12}", self.depth_test_passed);
        println!("  depth test failed:          {:12}", self.depth_test_failed);
        let depth_tests = self.depth_test_passed + self.depth_test_failed;
        if depth_tests > 0 {
            let pass_rate = (self.depth_test_passed as f64 / depth_tests as f64) * 100.0;
            println!("  depth test pass rate:       {:11.2}%", pass_rate);
        }

        println!();
    }
}

/// Global function counters instance
pub static FUNCTION_COUNTERS: FunctionCounters = FunctionCounters::new();

/// Macro for incrementing a counter (only when profiling feature is enabled)
#[macro_export]
macro_rules! count_call {
    ($counter:expr) => {
        #[cfg(feature = "profiling")]
        {
            $counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
    };
}

/// Macro for adding to a counter (only when profiling feature is enabled)
#[macro_export]
macro_rules! count_add {
    ($counter:expr, $value:expr) => {
        #[cfg(feature = "profiling")]
        {
            $counter.fetch_add($value as u64, std::sync::atomic::Ordering::Relaxed);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_and_reset() {
        let counters = FunctionCounters::new();
        counters.pixels_tested.fetch_add(5, Ordering::Relaxed);
        counters.depth_test_passed.fetch_add(2, Ordering::Relaxed);
        let snap = counters.snapshot();
        assert_eq!(snap.pixels_tested, 5);
        assert_eq!(snap.depth_test_passed, 2);

        counters.reset();
        assert_eq!(counters.snapshot(), CounterSnapshot::default());
    }
}
