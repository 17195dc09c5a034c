use std::cmp::Reverse;
use std::collections::BinaryHeap;

use image::{GrayImage, Luma};
use imageproc::point::Point;
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::detection::contours::{contour_area, find_external_contours};
use crate::detection::preprocessing::{FloatImage, BACKGROUND, FOREGROUND};
use crate::params::WatershedParams;

/// Label of pixels where two basins meet.
pub const BORDER: i32 = -1;
/// Label of pixels outside the foreground.
pub const UNLABELED: i32 = 0;

/// Per-pixel basin labels produced by [`watershed`].
#[derive(Debug, Clone)]
pub struct LabelMap {
    pub width: u32,
    pub height: u32,
    pub labels: Vec<i32>,
    pub basin_count: i32,
}

impl LabelMap {
    pub fn get(&self, x: u32, y: u32) -> i32 {
        self.labels[(y * self.width + x) as usize]
    }

    fn set(&mut self, x: u32, y: u32, label: i32) {
        let idx = (y * self.width + x) as usize;
        self.labels[idx] = label;
    }

    /// Binary mask of one basin.
    pub fn basin_mask(&self, label: i32) -> GrayImage {
        let mut mask = GrayImage::new(self.width, self.height);
        for (i, &l) in self.labels.iter().enumerate() {
            if l == label {
                let x = i as u32 % self.width;
                let y = i as u32 / self.width;
                mask.put_pixel(x, y, Luma([FOREGROUND]));
            }
        }
        mask
    }

    /// Grey rendering of the labels for debug output.
    pub fn to_debug_image(&self) -> GrayImage {
        let mut img = GrayImage::new(self.width, self.height);
        let scale = if self.basin_count > 0 { 200 / self.basin_count.max(1) } else { 0 };
        for (i, &l) in self.labels.iter().enumerate() {
            let value = match l {
                BORDER => 255,
                UNLABELED => 0,
                l => (40 + l * scale).min(230) as u8,
            };
            img.put_pixel(i as u32 % self.width, i as u32 / self.width, Luma([value]));
        }
        img
    }
}

#[derive(Debug, Clone, Copy)]
struct Seed {
    component: u32,
    peak: f32,
    x: u32,
    y: u32,
}

/// Flood the foreground of `mask` from seeds taken at the distance map's
/// strongest plateaus.
///
/// `sure_foreground` holds the seed regions; each 8-connected component is
/// one seed. Seeds whose peaks lie within `min_distance` of a stronger seed
/// merge into it, and when `markers` is non-zero only that many of the
/// strongest seeds survive. Pixels are flooded in order of decreasing
/// distance; a pixel touching two different basins becomes [`BORDER`].
pub fn watershed(
    mask: &GrayImage,
    dist: &FloatImage,
    sure_foreground: &GrayImage,
    params: &WatershedParams,
) -> LabelMap {
    let (width, height) = mask.dimensions();
    let mut map = LabelMap {
        width,
        height,
        labels: vec![UNLABELED; (width * height) as usize],
        basin_count: 0,
    };

    let components = connected_components(sure_foreground, Connectivity::Eight, Luma([BACKGROUND]));
    let seeds = select_seeds(&components, dist, params);
    if seeds.is_empty() {
        return map;
    }

    // component id -> basin label
    let max_component = components.pixels().map(|p| p[0]).max().unwrap_or(0) as usize;
    let mut basin_of = vec![UNLABELED; max_component + 1];
    for (component, label) in seeds {
        basin_of[component as usize] = label;
        map.basin_count = map.basin_count.max(label);
    }
    for (x, y, p) in components.enumerate_pixels() {
        let label = basin_of[p[0] as usize];
        if label > 0 && mask.get_pixel(x, y)[0] != BACKGROUND {
            map.set(x, y, label);
        }
    }

    let mut queue = BinaryHeap::new();
    let mut order: u64 = 0;
    let mut queued = vec![false; (width * height) as usize];
    for y in 0..height {
        for x in 0..width {
            if map.get(x, y) > 0 {
                for (nx, ny) in neighbours(x, y, width, height) {
                    let idx = (ny * width + nx) as usize;
                    if !queued[idx] && map.get(nx, ny) == UNLABELED && mask.get_pixel(nx, ny)[0] != BACKGROUND {
                        queued[idx] = true;
                        queue.push((dist.get_pixel(nx, ny)[0].to_bits(), Reverse(order), nx, ny));
                        order += 1;
                    }
                }
            }
        }
    }

    // non-negative floats order like their bit patterns
    while let Some((_, _, x, y)) = queue.pop() {
        let mut label = UNLABELED;
        for (nx, ny) in neighbours(x, y, width, height) {
            let l = map.get(nx, ny);
            if l <= 0 {
                continue;
            }
            if label == UNLABELED {
                label = l;
            } else if label != l {
                label = BORDER;
                break;
            }
        }
        map.set(x, y, label);
        if label == BORDER {
            continue;
        }

        for (nx, ny) in neighbours(x, y, width, height) {
            let idx = (ny * width + nx) as usize;
            if !queued[idx] && map.get(nx, ny) == UNLABELED && mask.get_pixel(nx, ny)[0] != BACKGROUND {
                queued[idx] = true;
                queue.push((dist.get_pixel(nx, ny)[0].to_bits(), Reverse(order), nx, ny));
                order += 1;
            }
        }
    }

    map
}

fn neighbours(x: u32, y: u32, width: u32, height: u32) -> impl Iterator<Item = (u32, u32)> {
    [
        (x.wrapping_sub(1), y),
        (x + 1, y),
        (x, y.wrapping_sub(1)),
        (x, y + 1),
    ]
    .into_iter()
    .filter(move |&(nx, ny)| nx < width && ny < height)
}

/// Rank seed components by peak distance, merge close ones and cap the
/// count. Returns `(component id, basin label)` pairs.
fn select_seeds(
    components: &image::ImageBuffer<Luma<u32>, Vec<u32>>,
    dist: &FloatImage,
    params: &WatershedParams,
) -> Vec<(u32, i32)> {
    let mut peaks: Vec<Seed> = Vec::new();
    for (x, y, p) in components.enumerate_pixels() {
        let component = p[0];
        if component == 0 {
            continue;
        }
        let d = dist.get_pixel(x, y)[0];
        match peaks.iter_mut().find(|s| s.component == component) {
            Some(seed) if d > seed.peak => {
                seed.peak = d;
                seed.x = x;
                seed.y = y;
            }
            Some(_) => {}
            None => peaks.push(Seed {
                component,
                peak: d,
                x,
                y,
            }),
        }
    }
    peaks.sort_by(|a, b| b.peak.total_cmp(&a.peak).then(a.component.cmp(&b.component)));

    let mut kept: Vec<Seed> = Vec::new();
    let mut assignment = Vec::new();
    for seed in peaks {
        let close = kept.iter().position(|k| {
            (k.x as f64 - seed.x as f64).hypot(k.y as f64 - seed.y as f64) < params.min_distance
        });
        match close {
            Some(idx) => assignment.push((seed.component, idx)),
            None => {
                if params.markers > 0 && kept.len() >= params.markers {
                    continue;
                }
                assignment.push((seed.component, kept.len()));
                kept.push(seed);
            }
        }
    }

    assignment
        .into_iter()
        .map(|(component, idx)| (component, idx as i32 + 1))
        .collect()
}

/// Largest external contour of every basin, in label order.
pub fn basin_contours(map: &LabelMap) -> Vec<Vec<Point<i32>>> {
    (1..=map.basin_count)
        .filter_map(|label| {
            find_external_contours(&map.basin_mask(label))
                .into_iter()
                .max_by(|a, b| contour_area(a).total_cmp(&contour_area(b)))
        })
        .collect()
}
